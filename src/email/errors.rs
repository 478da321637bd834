//! Email transport errors

use thiserror::Error;

/// Result type for email operations
pub type EmailResult<T> = Result<T, EmailError>;

/// Email transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    /// Sender or recipient could not be parsed as a mailbox
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The message could not be assembled
    #[error("Failed to build email: {0}")]
    Build(String),

    /// The SMTP relay could not be configured
    #[error("SMTP relay error: {0}")]
    Relay(String),

    /// The relay refused or the connection failed
    #[error("Failed to send email: {0}")]
    Send(String),
}
