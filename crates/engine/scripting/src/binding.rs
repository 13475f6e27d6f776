//! Typed bindings exchanged with the engines
//!
//! A pop call takes a `&mut [Slot]`, one output slot per schema leaf; a push
//! call takes a `Vec<Input>`. Both are checked against the schema's leaf tags
//! before any value is touched.

use crate::registry::Handle;
use crate::schema::Tag;
use crate::value::{Callable, Opaque, Value};
use crate::{Error, Result};

/// Output slot for pop.
///
/// Under LENIENT policy a failing leaf is reset to its default: `false`, `0`,
/// `0.0` or the empty string. Callable and opaque slots are left untouched.
#[derive(Debug)]
pub enum Slot<'a> {
    /// Bound by `b`
    Bool(&'a mut bool),
    /// Bound by `i`
    Int(&'a mut i64),
    /// Bound by `i`; values outside `i32` are out of range
    Int32(&'a mut i32),
    /// Bound by `i`; negative or oversized values are out of range
    UInt32(&'a mut u32),
    /// Bound by `f`
    Float(&'a mut f64),
    /// Bound by `f`; finite values beyond `f32` are out of range
    Float32(&'a mut f32),
    /// Bound by `s`; numbers are formatted as Lua's `tostring` does
    String(&'a mut String),
    /// Bound by `l`; receives the handle of the registered function
    Callable(&'a mut Option<Handle>),
    /// Bound by `u`; receives a shared reference to the host object
    Opaque(&'a mut Option<Opaque>),
}

impl Slot<'_> {
    /// Schema tag this slot binds to
    pub fn tag(&self) -> Tag {
        match self {
            Slot::Bool(_) => Tag::Bool,
            Slot::Int(_) | Slot::Int32(_) | Slot::UInt32(_) => Tag::Int,
            Slot::Float(_) | Slot::Float32(_) => Tag::Float,
            Slot::String(_) => Tag::String,
            Slot::Callable(_) => Tag::Callable,
            Slot::Opaque(_) => Tag::Opaque,
        }
    }

    /// Write the lenient default
    pub fn reset(&mut self) {
        match self {
            Slot::Bool(out) => **out = false,
            Slot::Int(out) => **out = 0,
            Slot::Int32(out) => **out = 0,
            Slot::UInt32(out) => **out = 0,
            Slot::Float(out) => **out = 0.0,
            Slot::Float32(out) => **out = 0.0,
            Slot::String(out) => out.clear(),
            Slot::Callable(_) | Slot::Opaque(_) => {}
        }
    }
}

macro_rules! impl_slot_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a mut $ty> for Slot<'a> {
                fn from(out: &'a mut $ty) -> Self {
                    Slot::$variant(out)
                }
            }
        )*
    };
}

impl_slot_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int32,
    u32 => UInt32,
    f64 => Float,
    f32 => Float32,
    String => String,
    Option<Handle> => Callable,
    Option<Opaque> => Opaque,
}

/// Build a slot array from mutable references: `slots![&mut a, &mut b]`
#[macro_export]
macro_rules! slots {
    ($($out:expr),* $(,)?) => {
        [$($crate::Slot::from($out)),*]
    };
}

/// Input value for push
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// For `b`
    Bool(bool),
    /// For `i`
    Int(i64),
    /// For `f`
    Float(f64),
    /// For `s`
    String(String),
    /// For `l`; the function is moved into the pushed value
    Callable(Callable),
    /// For `u`; the reference is moved, never the object
    Opaque(Opaque),
}

impl Input {
    /// Schema tag this input binds to
    pub fn tag(&self) -> Tag {
        match self {
            Input::Bool(_) => Tag::Bool,
            Input::Int(_) => Tag::Int,
            Input::Float(_) => Tag::Float,
            Input::String(_) => Tag::String,
            Input::Callable(_) => Tag::Callable,
            Input::Opaque(_) => Tag::Opaque,
        }
    }

    /// Pushed form of this input
    pub fn into_value(self) -> Value {
        match self {
            Input::Bool(b) => Value::Bool(b),
            Input::Int(i) => Value::Int(i),
            Input::Float(f) => Value::Float(f),
            Input::String(s) => Value::String(s),
            Input::Callable(c) => Value::Callable(c),
            Input::Opaque(o) => Value::Opaque(o),
        }
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Bool(b)
    }
}

impl From<i64> for Input {
    fn from(i: i64) -> Self {
        Input::Int(i)
    }
}

impl From<i32> for Input {
    fn from(i: i32) -> Self {
        Input::Int(i as i64)
    }
}

impl From<u32> for Input {
    fn from(i: u32) -> Self {
        Input::Int(i as i64)
    }
}

impl From<f64> for Input {
    fn from(f: f64) -> Self {
        Input::Float(f)
    }
}

impl From<f32> for Input {
    fn from(f: f32) -> Self {
        Input::Float(f as f64)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::String(s.to_string())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::String(s)
    }
}

impl From<Callable> for Input {
    fn from(c: Callable) -> Self {
        Input::Callable(c)
    }
}

impl From<Opaque> for Input {
    fn from(o: Opaque) -> Self {
        Input::Opaque(o)
    }
}

/// Build an input list: `inputs![1, "name", 0.5]`
#[macro_export]
macro_rules! inputs {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Input::from($value)),*]
    };
}

/// Check binding tags against schema leaves, position by position
pub(crate) fn check_arity(expected: &[Tag], found: impl IntoIterator<Item = Tag>) -> Result<()> {
    let mut found = found.into_iter();
    for (index, &tag) in expected.iter().enumerate() {
        match found.next() {
            Some(got) if got == tag => {}
            got => {
                return Err(Error::Arity {
                    index,
                    expected: Some(tag),
                    found: got,
                })
            }
        }
    }
    match found.next() {
        Some(extra) => Err(Error::Arity {
            index: expected.len(),
            expected: None,
            found: Some(extra),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_tags_and_reset() {
        let mut count = 7u32;
        let mut name = String::from("old");
        let mut scale = 2.5f32;
        let mut handle = Some(Handle::from_raw(4));

        let mut slots = slots![&mut count, &mut name, &mut scale, &mut handle];
        let tags: Vec<Tag> = slots.iter().map(Slot::tag).collect();
        assert_eq!(tags, vec![Tag::Int, Tag::String, Tag::Float, Tag::Callable]);

        for slot in slots.iter_mut() {
            slot.reset();
        }
        drop(slots);
        assert_eq!(count, 0);
        assert_eq!(name, "");
        assert_eq!(scale, 0.0);
        assert_eq!(handle, Some(Handle::from_raw(4)));
    }

    #[test]
    fn test_inputs_macro() {
        let inputs = inputs![1i64, "two", 3.0f32, true];
        assert_eq!(
            inputs.iter().map(Input::tag).collect::<Vec<_>>(),
            vec![Tag::Int, Tag::String, Tag::Float, Tag::Bool]
        );
        assert_eq!(inputs[1].clone().into_value(), Value::from("two"));
    }

    #[test]
    fn test_check_arity() {
        let schema = [Tag::Int, Tag::String];
        assert!(check_arity(&schema, [Tag::Int, Tag::String]).is_ok());

        assert!(matches!(
            check_arity(&schema, [Tag::Int]),
            Err(Error::Arity { index: 1, expected: Some(Tag::String), found: None })
        ));
        assert!(matches!(
            check_arity(&schema, [Tag::Int, Tag::Float]),
            Err(Error::Arity { index: 1, expected: Some(Tag::String), found: Some(Tag::Float) })
        ));
        assert!(matches!(
            check_arity(&schema, [Tag::Int, Tag::String, Tag::Bool]),
            Err(Error::Arity { index: 2, expected: None, found: Some(Tag::Bool) })
        ));
    }
}
