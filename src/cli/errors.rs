//! CLI-specific error types
//!
//! Every CLI error is fatal: printed as `<CODE>: <message>` and the process
//! exits non-zero.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::email::EmailError;
use crate::identity::StoreError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file missing, malformed or invalid
    #[error("GATEKEEPER_CLI_CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// Identity store could not be opened
    #[error("GATEKEEPER_CLI_STORE_ERROR: {0}")]
    Store(#[from] StoreError),

    /// Mail transport could not be built
    #[error("GATEKEEPER_CLI_EMAIL_ERROR: {0}")]
    Email(#[from] EmailError),

    /// Runtime, listener or stdout failure
    #[error("GATEKEEPER_CLI_IO_ERROR: {0}")]
    Io(String),

    /// A long-running component stopped abnormally
    #[error("GATEKEEPER_CLI_RUNTIME_ERROR: {0}")]
    Runtime(String),
}

impl CliError {
    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        match self {
            CliError::Config(_) => "GATEKEEPER_CLI_CONFIG_ERROR",
            CliError::Store(_) => "GATEKEEPER_CLI_STORE_ERROR",
            CliError::Email(_) => "GATEKEEPER_CLI_EMAIL_ERROR",
            CliError::Io(_) => "GATEKEEPER_CLI_IO_ERROR",
            CliError::Runtime(_) => "GATEKEEPER_CLI_RUNTIME_ERROR",
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::from(ConfigError::Malformed("expected value".into()));
        assert_eq!(err.code_str(), "GATEKEEPER_CLI_CONFIG_ERROR");
        assert!(err.to_string().starts_with("GATEKEEPER_CLI_CONFIG_ERROR: "));
    }
}
