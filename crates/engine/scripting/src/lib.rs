//! Schema-driven marshalling between Lua and Rust
//!
//! This crate provides:
//! - **Schema**: a compact text grammar describing the shape of a value,
//!   e.g. `{name: s, color: {1: f, 2: f, 3: f}}; l`
//! - **Pop**: walk dynamic values against a schema into typed native slots
//! - **Push**: build dynamic values from native inputs against a schema
//! - **HandleRegistry**: opaque ids for Lua functions held by the host
//! - **LuaRuntime**: `mlua` state wrapper tying the pieces together
//!
//! # Example
//!
//! ```rust,ignore
//! use scripting::{slots, LuaRuntime};
//!
//! let runtime = LuaRuntime::new()?;
//! runtime.exec_string("config = { name = 'sampler', size = {16, 8} }")?;
//!
//! let (mut name, mut w, mut h) = (String::new(), 0u32, 0u32);
//! runtime.pop_global(
//!     "config",
//!     "{name: s, size: {1: i, 2: i}}",
//!     &mut slots![&mut name, &mut w, &mut h],
//! )?;
//! ```

mod binding;
mod error;
mod logger;
mod lua;
mod marshal;
mod pop;
mod push;
mod registry;
mod schema;
mod value;

pub use binding::{Input, Slot};
pub use error::{Error, Result};
pub use logger::{LogRecord, Logger, RecordingLogger, TracingLogger};
pub use lua::LuaRuntime;
pub use marshal::{KeyPath, MarshalContext, Marshaller, Policy};
pub use registry::{Entry, Handle, HandleRegistry};
pub use schema::{Directive, Schema, Tag, DEFAULT_MAX_DEPTH};
pub use value::{Callable, Key, NativeFn, Opaque, Table, Value};

// Re-export mlua for downstream crates
pub use mlua;
