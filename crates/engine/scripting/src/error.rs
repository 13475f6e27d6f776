//! Error types for the marshalling layer

use crate::registry::Handle;
use crate::schema::Tag;
use thiserror::Error;

/// Result type for marshalling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing schemas or moving values across the
/// Lua boundary
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed schema text
    #[error("schema syntax error at {position}: expected {expected}, found {found}")]
    SchemaSyntax {
        position: usize,
        found: String,
        expected: String,
    },

    /// Dynamic value does not satisfy the expected tag
    #[error("type mismatch at '{path}': expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Required table key absent (or nil)
    #[error("key '{key}' not found at '{path}'")]
    MissingKey { path: String, key: String },

    /// Numeric value does not fit the native slot
    #[error("value {value} at '{path}' out of {target} range")]
    OutOfRange {
        path: String,
        value: String,
        target: &'static str,
    },

    /// Binding list disagrees with the schema's leaves
    #[error("binding {index}: schema expects {}, caller supplied {}", describe(.expected), describe(.found))]
    Arity {
        index: usize,
        expected: Option<Tag>,
        found: Option<Tag>,
    },

    /// Registry lookup on an unknown or released id
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    /// Schema or value nesting exceeds the depth cap
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// Failure raised by a host function, surfaced to Lua as a runtime error
    #[error("{0}")]
    Runtime(String),

    /// Lua error
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe(tag: &Option<Tag>) -> String {
    match tag {
        Some(tag) => format!("'{}' ({})", tag.as_char(), tag.name()),
        None => "nothing".to_string(),
    }
}

impl Error {
    /// Whether LENIENT policy may replace the failing leaf with a default
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. } | Error::MissingKey { .. } | Error::OutOfRange { .. }
        )
    }

    /// Key path the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::TypeMismatch { path, .. }
            | Error::MissingKey { path, .. }
            | Error::OutOfRange { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Plain runtime error with a message, for host functions
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    /// Re-anchor a path-carrying error at `at`
    pub(crate) fn at(self, at: impl ToString) -> Self {
        match self {
            Error::TypeMismatch {
                expected, actual, ..
            } => Error::TypeMismatch {
                path: at.to_string(),
                expected,
                actual,
            },
            Error::OutOfRange { value, target, .. } => Error::OutOfRange {
                path: at.to_string(),
                value,
                target,
            },
            other => other,
        }
    }

    pub(crate) fn mismatch(path: impl ToString, expected: &str, actual: &str) -> Self {
        Error::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
