//! Lua runtime bridge
//!
//! Wraps an `mlua` state together with the handle registry and the marshaller
//! settings for that state. Provides:
//! - Conversion between `mlua` values and [`Value`]
//! - Host functions exposed to Lua, taking and returning [`Value`]s
//! - Schema-driven reads of globals and calls into Lua functions

use crate::binding::{Input, Slot};
use crate::logger::{Logger, TracingLogger};
use crate::marshal::{MarshalContext, Marshaller, Policy};
use crate::registry::{Handle, HandleRegistry};
use crate::schema::DEFAULT_MAX_DEPTH;
use crate::value::{Callable, Key, Opaque, Table, Value};
use crate::{Error, Result};
use mlua::{AnyUserData, Function, LightUserData, Lua, MultiValue, Thread, UserData};
use mlua::Value as LuaValue;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// Host object handed to Lua as full userdata
struct HostObject(Opaque);

impl UserData for HostObject {}

/// A Lua state with its own handle registry
pub struct LuaRuntime {
    lua: Lua,
    registry: Rc<HandleRegistry>,
    logger: Rc<dyn Logger>,
    policy: Policy,
    max_depth: usize,
}

impl LuaRuntime {
    /// Create a runtime with the standard libraries loaded, strict policy and
    /// `tracing` diagnostics
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        tracing::debug!("created Lua runtime");

        Ok(Self {
            lua,
            registry: Rc::new(HandleRegistry::new()),
            logger: Rc::new(TracingLogger),
            policy: Policy::Strict,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    /// Error policy for every pop through this runtime
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Where pop diagnostics go; `tracing` by default
    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Nesting cap for schemas and value conversion
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Get the underlying Lua state
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Shared registry, for host functions that pop callables
    pub fn shared_registry(&self) -> Rc<HandleRegistry> {
        self.registry.clone()
    }

    pub fn logger(&self) -> Rc<dyn Logger> {
        self.logger.clone()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Owned copy of the marshaller settings, for host functions that pop or
    /// push their arguments
    pub fn context(&self) -> MarshalContext {
        MarshalContext::new(self.registry.clone(), self.logger.clone())
            .with_policy(self.policy)
            .with_max_depth(self.max_depth)
    }

    /// Marshaller bound to this runtime's registry, policy and logger
    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.registry)
            .with_policy(self.policy)
            .with_logger(&*self.logger)
            .with_max_depth(self.max_depth)
    }

    /// Load and execute a Lua file
    pub fn exec_file(&self, path: &Path) -> Result<()> {
        self.eval_file(path).map(|_| ())
    }

    /// Execute a Lua string
    pub fn exec_string(&self, code: &str) -> Result<()> {
        self.lua.load(code).exec()?;
        Ok(())
    }

    /// Evaluate a chunk and convert its return values
    pub fn eval(&self, code: &str, chunk_name: &str) -> Result<Vec<Value>> {
        let results: MultiValue = self.lua.load(code).set_name(chunk_name).eval()?;
        results.into_iter().map(|v| self.to_value(&v)).collect()
    }

    /// Evaluate a Lua file and convert its return values
    pub fn eval_file(&self, path: &Path) -> Result<Vec<Value>> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("evaluating {}", path.display());
        self.eval(&content, &format!("@{}", path.display()))
    }

    /// Read a global as a [`Value`]
    pub fn global(&self, name: &str) -> Result<Value> {
        let value: LuaValue = self.lua.globals().get(name)?;
        self.to_value(&value)
    }

    /// Set a global from a [`Value`]
    pub fn set_global(&self, name: &str, value: &Value) -> Result<()> {
        let value = self.to_lua(value)?;
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Expose a host function to Lua as a global. Errors returned by `f` are
    /// raised as Lua errors and can be caught with `pcall`.
    pub fn expose<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Vec<Value>> + 'static,
    {
        let function = host_function(&self.lua, Callable::new(f), self.max_depth)?;
        self.lua.globals().set(name, function)?;
        tracing::debug!("exposed host function '{}'", name);
        Ok(())
    }

    /// Pop a global against a schema
    pub fn pop_global(&self, name: &str, schema: &str, slots: &mut [Slot<'_>]) -> Result<()> {
        let value = self.global(name)?;
        self.marshaller().pop(&value, schema, slots)
    }

    /// Call a global Lua function with pushed arguments
    pub fn call_global(&self, name: &str, schema: &str, inputs: Vec<Input>) -> Result<Vec<Value>> {
        let args = self.marshaller().push(schema, inputs)?;
        let function: Function = self.lua.globals().get(name)?;
        self.call(&function, &args)
    }

    /// Call a Lua function with already built arguments
    pub fn call(&self, function: &Function, args: &[Value]) -> Result<Vec<Value>> {
        let args = args
            .iter()
            .map(|v| self.to_lua(v))
            .collect::<Result<MultiValue>>()?;
        let results: MultiValue = function.call(args)?;
        results.into_iter().map(|v| self.to_value(&v)).collect()
    }

    /// Invoke a registered callable
    pub fn invoke(&self, handle: Handle, args: &[Value]) -> Result<Vec<Value>> {
        self.registry.invoke(handle, args)
    }

    /// Release a registered callable; releasing twice is an error
    pub fn release(&self, handle: Handle) -> Result<()> {
        self.registry.release(handle)
    }

    /// Convert a Lua value
    pub fn to_value(&self, value: &LuaValue) -> Result<Value> {
        lua_to_value(&self.lua, value, 1, self.max_depth)
    }

    /// Convert a value into this Lua state
    pub fn to_lua(&self, value: &Value) -> Result<LuaValue> {
        value_to_lua(&self.lua, value, 1, self.max_depth)
    }
}

impl fmt::Debug for LuaRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaRuntime")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Host errors pass through as Lua errors; Lua errors are not re-wrapped
fn into_lua_error(err: Error) -> mlua::Error {
    match err {
        Error::Lua(e) => e,
        other => mlua::Error::external(other),
    }
}

fn lua_key(key: &LuaValue) -> Option<Key> {
    match key {
        LuaValue::String(s) => Some(Key::Named(s.to_string_lossy().into())),
        LuaValue::Integer(i) => Some(Key::Index(*i)),
        LuaValue::Number(n) if n.fract() == 0.0 => Some(Key::Index(*n as i64)),
        _ => None,
    }
}

/// Convert a Lua value. Tables may be cyclic, so depth is capped.
fn lua_to_value(lua: &Lua, value: &LuaValue, depth: usize, max_depth: usize) -> Result<Value> {
    if depth > max_depth {
        return Err(Error::RecursionLimit { limit: max_depth });
    }

    let value = match value {
        LuaValue::Nil => Value::Nil,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(i) => Value::Int(*i),
        LuaValue::Number(n) => Value::Float(*n),
        LuaValue::String(s) => Value::String(s.to_string_lossy().into()),
        LuaValue::Table(t) => {
            let mut table = Table::new();
            for pair in t.clone().pairs::<LuaValue, LuaValue>() {
                let (k, v) = pair?;
                // Keys other than strings and integers have no schema form
                let Some(key) = lua_key(&k) else {
                    continue;
                };
                table.insert(key, lua_to_value(lua, &v, depth + 1, max_depth)?);
            }
            Value::Table(table)
        }
        LuaValue::Function(f) => Value::Callable(lua_callable(lua, f.clone(), max_depth)),
        LuaValue::UserData(ud) => match ud.borrow::<HostObject>() {
            Ok(host) => Value::Opaque(host.0.clone()),
            Err(_) => Value::Opaque(Opaque::new(ud.clone())),
        },
        LuaValue::LightUserData(p) => Value::Opaque(Opaque::new(*p)),
        LuaValue::Thread(t) => Value::Opaque(Opaque::new(t.clone())),
        other => {
            tracing::debug!("dropping unsupported Lua value of type {}", other.type_name());
            Value::Nil
        }
    };
    Ok(value)
}

fn value_to_lua(lua: &Lua, value: &Value, depth: usize, max_depth: usize) -> Result<LuaValue> {
    if depth > max_depth {
        return Err(Error::RecursionLimit { limit: max_depth });
    }

    let value = match value {
        Value::Nil => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Int(i) => LuaValue::Integer(*i),
        Value::Float(f) => LuaValue::Number(*f),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Table(t) => {
            let table = lua.create_table()?;
            for (key, v) in t.iter() {
                let key = match key {
                    Key::Named(name) => LuaValue::String(lua.create_string(name)?),
                    Key::Index(i) => LuaValue::Integer(*i),
                };
                table.raw_set(key, value_to_lua(lua, v, depth + 1, max_depth)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Callable(c) => LuaValue::Function(host_function(lua, c.clone(), max_depth)?),
        Value::Opaque(o) => {
            if let Some(ud) = o.downcast_ref::<AnyUserData>() {
                LuaValue::UserData(ud.clone())
            } else if let Some(p) = o.downcast_ref::<LightUserData>() {
                LuaValue::LightUserData(*p)
            } else if let Some(t) = o.downcast_ref::<Thread>() {
                LuaValue::Thread(t.clone())
            } else {
                LuaValue::UserData(lua.create_userdata(HostObject(o.clone()))?)
            }
        }
    };
    Ok(value)
}

/// Wrap a Lua function as a [`Callable`]. Holds the state weakly so a callable
/// stored back inside Lua does not keep the state alive.
fn lua_callable(lua: &Lua, function: Function, max_depth: usize) -> Callable {
    let weak = lua.weak();
    Callable::new(move |args| {
        let lua = weak
            .try_upgrade()
            .ok_or_else(|| Error::runtime("Lua state has been closed"))?;
        let args = args
            .iter()
            .map(|v| value_to_lua(&lua, v, 1, max_depth))
            .collect::<Result<MultiValue>>()?;
        let results: MultiValue = function.call(args)?;
        results
            .into_iter()
            .map(|v| lua_to_value(&lua, &v, 1, max_depth))
            .collect()
    })
}

/// Wrap a [`Callable`] as a Lua function
fn host_function(lua: &Lua, callable: Callable, max_depth: usize) -> Result<Function> {
    let function = lua.create_function(move |lua, args: MultiValue| {
        let args = args
            .into_iter()
            .map(|v| lua_to_value(lua, &v, 1, max_depth))
            .collect::<Result<Vec<Value>>>()
            .map_err(into_lua_error)?;
        let results = callable.call(&args).map_err(into_lua_error)?;
        results
            .iter()
            .map(|v| value_to_lua(lua, v, 1, max_depth))
            .collect::<Result<MultiValue>>()
            .map_err(into_lua_error)
    })?;
    Ok(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RecordingLogger;
    use crate::{inputs, slots};

    #[test]
    fn test_lua_runtime_basic() {
        let runtime = LuaRuntime::new().unwrap();
        runtime.exec_string("x = 42").unwrap();
        assert_eq!(runtime.global("x").unwrap(), Value::Int(42));

        let values = runtime.eval("return 1, 'two', 3.5", "test").unwrap();
        assert_eq!(
            values,
            vec![Value::Int(1), Value::from("two"), Value::Float(3.5)]
        );
    }

    #[test]
    fn test_pop_global_with_callable() {
        let runtime = LuaRuntime::new().unwrap();
        runtime
            .exec_string(
                r#"
                config = {
                    name = "sampler",
                    color = {0.5, 0.25, 1},
                    double = function(x) return x * 2 end,
                }
            "#,
            )
            .unwrap();

        let mut name = String::new();
        let (mut r, mut g, mut b) = (0f32, 0f32, 0f32);
        let mut double: Option<Handle> = None;
        runtime
            .pop_global(
                "config",
                "{name: s, color: {1: f, 2: f, 3: f}, double: l}",
                &mut slots![&mut name, &mut r, &mut g, &mut b, &mut double],
            )
            .unwrap();

        assert_eq!(name, "sampler");
        assert_eq!((r, g, b), (0.5, 0.25, 1.0));

        let handle = double.unwrap();
        assert_eq!(
            runtime.invoke(handle, &[Value::Int(21)]).unwrap(),
            vec![Value::Int(42)]
        );
        runtime.release(handle).unwrap();
        assert!(matches!(
            runtime.invoke(handle, &[Value::Int(1)]),
            Err(Error::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_expose_host_function() {
        let runtime = LuaRuntime::new().unwrap();
        let registry = runtime.shared_registry();
        runtime
            .expose("add", move |args| {
                let (mut a, mut b) = (0i64, 0i64);
                Marshaller::new(&registry).pop_sequence(args, "i; i", &mut slots![&mut a, &mut b])?;
                Ok(vec![Value::Int(a + b)])
            })
            .unwrap();

        runtime.exec_string("result = add(2, 3)").unwrap();
        assert_eq!(runtime.global("result").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_host_error_is_catchable_in_lua() {
        let runtime = LuaRuntime::new().unwrap();
        let registry = runtime.shared_registry();
        runtime
            .expose("add", move |args| {
                let (mut a, mut b) = (0i64, 0i64);
                Marshaller::new(&registry).pop_sequence(args, "i; i", &mut slots![&mut a, &mut b])?;
                Ok(vec![Value::Int(a + b)])
            })
            .unwrap();

        runtime
            .exec_string(
                r#"
                local ok, err = pcall(add, "x", 1)
                caught = not ok
                message = tostring(err)
            "#,
            )
            .unwrap();

        assert_eq!(runtime.global("caught").unwrap(), Value::Bool(true));
        let message = runtime.global("message").unwrap();
        assert!(message.as_str().unwrap().contains("type mismatch at '#1'"));
    }

    #[test]
    fn test_call_global_with_pushed_arguments() {
        let runtime = LuaRuntime::new().unwrap();
        runtime
            .exec_string("function scale(v, k) return {v[1] * k, v[2] * k} end")
            .unwrap();

        let out = runtime
            .call_global("scale", "{1: f, 2: f}; f", inputs![1.0f64, 2.0f64, 3.0f64])
            .unwrap();
        let t = out[0].as_table().unwrap();
        assert_eq!(t.get(&Key::Index(1)), Some(&Value::Float(3.0)));
        assert_eq!(t.get(&Key::Index(2)), Some(&Value::Float(6.0)));
    }

    #[test]
    fn test_opaque_round_trip_keeps_identity() {
        let runtime = LuaRuntime::new().unwrap();
        let scene = Opaque::new(String::from("scene"));
        runtime.set_global("scene", &Value::Opaque(scene.clone())).unwrap();
        runtime.exec_string("same = scene").unwrap();

        let mut out: Option<Opaque> = None;
        runtime
            .pop_global("same", "u", &mut slots![&mut out])
            .unwrap();
        assert!(out.unwrap().ptr_eq(&scene));
    }

    #[test]
    fn test_string_leaf_matches_tostring() {
        let runtime = LuaRuntime::new().unwrap();
        for expr in ["0.1 + 0.2", "1e15", "2^63", "-0.0", "7", "3 / 2"] {
            runtime
                .exec_string(&format!("x = {expr}; printed = tostring(x)"))
                .unwrap();

            let mut popped = String::new();
            runtime
                .pop_global("x", "s", &mut slots![&mut popped])
                .unwrap();
            let printed = runtime.global("printed").unwrap();
            assert_eq!(popped, printed.as_str().unwrap(), "{expr}");
        }
    }

    #[test]
    fn test_cyclic_table_hits_recursion_limit() {
        let runtime = LuaRuntime::new().unwrap();
        runtime.exec_string("t = {}; t.self = t").unwrap();
        assert!(matches!(
            runtime.global("t"),
            Err(Error::RecursionLimit { limit: DEFAULT_MAX_DEPTH })
        ));
    }

    #[test]
    fn test_lenient_runtime_logs_defaults() {
        let logger = Rc::new(RecordingLogger::new());
        let runtime = LuaRuntime::new()
            .unwrap()
            .with_policy(Policy::Lenient)
            .with_logger(logger.clone());
        runtime
            .exec_string("settings = {iterations = 'many', max_depth = 8}")
            .unwrap();

        let (mut iterations, mut max_depth) = (5u32, 0u32);
        runtime
            .pop_global(
                "settings",
                "{iterations: i, max_depth: i}",
                &mut slots![&mut iterations, &mut max_depth],
            )
            .unwrap();

        assert_eq!((iterations, max_depth), (0, 8));
        assert_eq!(logger.warnings().len(), 1);
    }
}
