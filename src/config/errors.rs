//! Configuration errors
//!
//! Every configuration problem is a startup error.

use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading and validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// Config file is not valid JSON for the expected shape
    #[error("Invalid config JSON: {0}")]
    Malformed(String),

    /// A field failed validation
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
