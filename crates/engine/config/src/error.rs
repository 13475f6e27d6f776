//! Error types for configuration loading

use thiserror::Error;

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Script failed to run or its table did not match the schema
    #[error(transparent)]
    Script(#[from] scripting::Error),

    /// Value passed the schema but is unusable
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// Scene data function already consumed or never bound
    #[error("configuration has no scene data function")]
    MissingSceneData,
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
