//! Dynamic values mirroring the Lua side of the boundary

use crate::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A table key: string field or integer position (1-based for sequences)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Identifier key, `name` in `{name: s}`
    Named(String),
    /// Integer key, `2` in `{1: f, 2: f}`
    Index(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Named(name) => write!(f, "{}", name),
            Key::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Named(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Named(name)
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

/// Signature of a native function callable from either side
pub type NativeFn = dyn Fn(&[Value]) -> Result<Vec<Value>>;

/// A shared, invocable function value
#[derive(Clone)]
pub struct Callable(Rc<NativeFn>);

impl Callable {
    /// Wrap a native function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Call with `args`, returning every result value
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>> {
        (self.0)(args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// A shared reference to a host object. Cloning never copies the object.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    /// Take ownership of `value` behind a new shared reference
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn from_rc(rc: Rc<dyn Any>) -> Self {
        Self(rc)
    }

    /// Borrow the object as `T`, if that is its type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// A Lua table; iteration order is unspecified
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    entries: HashMap<Key, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence table with keys `1..=n`
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Key::Index(i as i64 + 1), v))
            .collect()
    }

    /// Value under `key`; absent keys read as nil in Lua
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert a value; inserting nil removes the key, as in Lua
    pub fn insert(&mut self, key: impl Into<Key>, value: Value) {
        let key = key.into();
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Number of non-nil entries, named and indexed alike
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the `1..=n` prefix with no holes
    pub fn sequence_len(&self) -> usize {
        let mut n = 0;
        while self.entries.contains_key(&Key::Index(n as i64 + 1)) {
            n += 1;
        }
        n
    }

    /// Entries in unspecified order; look keys up with [`Table::get`] when
    /// order matters
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }
}

impl FromIterator<(Key, Value)> for Table {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut table = Table::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

/// A value on the Lua side of the boundary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    /// Lua integer subtype
    Int(i64),
    /// Lua float subtype
    Float(f64),
    String(String),
    Table(Table),
    /// A function, either native or a reference into a Lua state
    Callable(Callable),
    /// Host object carried through Lua as userdata
    Opaque(Opaque),
}

impl Value {
    /// Lua type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Callable(_) => "function",
            Value::Opaque(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Booleans only; Lua truthiness does not apply
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::mismatch("", "boolean", self.type_name())),
        }
    }

    /// Integer-valued numbers; `3.0` counts, `3.5` does not
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(*f as i64),
            Value::Float(_) => Err(Error::mismatch("", "integer", "non-integral number")),
            _ => Err(Error::mismatch("", "integer", self.type_name())),
        }
    }

    /// Any number, integers widened
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(Error::mismatch("", "number", self.type_name())),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            _ => Err(Error::mismatch("", "string", self.type_name())),
        }
    }

    /// Owned string for string-like values. Numbers are formatted the way
    /// Lua's `tostring` formats them.
    pub fn to_lua_string(&self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(lua_float_string(*f)),
            _ => Err(Error::mismatch("", "string", self.type_name())),
        }
    }

    pub fn as_table(&self) -> Result<&Table> {
        match self {
            Value::Table(t) => Ok(t),
            _ => Err(Error::mismatch("", "table", self.type_name())),
        }
    }
}

/// Significant digits Lua prints for floats (`LUAI_NUMFFORMAT` is `%.14g`)
const FLOAT_DIGITS: i32 = 14;

/// `%.14g`, plus a `.0` suffix when the result would read as an integer
fn lua_float_string(f: f64) -> String {
    if f.is_nan() {
        return (if f.is_sign_negative() { "-nan" } else { "nan" }).to_string();
    }
    if f.is_infinite() {
        return (if f < 0.0 { "-inf" } else { "inf" }).to_string();
    }

    // Exponent after rounding to the significant digits
    let sci = format!("{:.*e}", (FLOAT_DIGITS - 1) as usize, f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    let mut out = if exp < -4 || exp >= FLOAT_DIGITS {
        let sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exp.unsigned_abs()
        )
    } else {
        let decimals = (FLOAT_DIGITS - 1 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    };

    if out.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        out.push_str(".0");
    }
    out
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Table(Table::from_sequence(v.into_iter().map(Into::into)))
    }
}
