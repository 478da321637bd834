//! # Verification Errors
//!
//! The taxonomy every entry point surfaces. The message of the four client
//! variants is shown to whoever triggered the operation; internal variants
//! are logged and replaced by a generic message.

use thiserror::Error;

use crate::email::EmailError;
use crate::identity::{StoreError, UniqueKey};
use crate::platform::PlatformError;

use super::messages;

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    // ==================
    // Expected, user-facing
    // ==================
    /// Malformed or unapproved email, malformed request
    #[error("{0}")]
    Validation(String),

    /// Duplicate key or incompatible state
    #[error("{0}")]
    Conflict(String),

    /// Unknown code, member or team
    #[error("{0}")]
    NotFound(String),

    /// Caller lacks the admin capability
    #[error("❌ You don't have permission to use this command.")]
    Authorization,

    // ==================
    // System failures
    // ==================
    /// Email send or platform call failed
    #[error("External service failed: {0}")]
    ExternalService(String),

    /// Identity store failure
    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl VerifyError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            VerifyError::Validation(_) => 400,
            VerifyError::Conflict(_) => 409,
            VerifyError::NotFound(_) => 404,
            VerifyError::Authorization => 403,
            VerifyError::ExternalService(_) => 502,
            VerifyError::Storage(_) => 500,
        }
    }

    /// Whether this error is the caller's to fix (never logged as a system failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VerifyError::Validation(_)
                | VerifyError::Conflict(_)
                | VerifyError::NotFound(_)
                | VerifyError::Authorization
        )
    }

    /// Stable machine-readable code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::Validation(_) => "VALIDATION",
            VerifyError::Conflict(_) => "CONFLICT",
            VerifyError::NotFound(_) => "NOT_FOUND",
            VerifyError::Authorization => "AUTHORIZATION",
            VerifyError::ExternalService(_) => "EXTERNAL_SERVICE",
            VerifyError::Storage(_) => "STORAGE",
        }
    }
}

impl From<StoreError> for VerifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => VerifyError::NotFound("Record not found.".to_string()),
            StoreError::Conflict(UniqueKey::Email) => {
                VerifyError::Conflict(messages::EMAIL_TAKEN.to_string())
            }
            StoreError::Conflict(_) => {
                VerifyError::Conflict("A record already exists for this member.".to_string())
            }
            StoreError::StateMismatch { actual, .. } => {
                VerifyError::Conflict(format!("Record is already {}.", actual))
            }
            StoreError::Stale(what) => {
                VerifyError::Conflict(format!("Record changed concurrently ({}).", what))
            }
            internal => VerifyError::Storage(internal),
        }
    }
}

impl From<EmailError> for VerifyError {
    fn from(err: EmailError) -> Self {
        VerifyError::ExternalService(err.to_string())
    }
}

impl From<PlatformError> for VerifyError {
    fn from(err: PlatformError) -> Self {
        VerifyError::ExternalService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::VerificationState;

    #[test]
    fn test_status_codes() {
        assert_eq!(VerifyError::Validation("x".into()).status_code(), 400);
        assert_eq!(VerifyError::NotFound("x".into()).status_code(), 404);
        assert_eq!(VerifyError::Authorization.status_code(), 403);
        assert_eq!(VerifyError::Storage(StoreError::Poisoned).status_code(), 500);
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            VerifyError::from(StoreError::Conflict(UniqueKey::Email)),
            VerifyError::Conflict(_)
        ));
        assert!(matches!(
            VerifyError::from(StoreError::StateMismatch {
                expected: VerificationState::Pending,
                actual: VerificationState::Verified,
            }),
            VerifyError::Conflict(_)
        ));

        let internal = VerifyError::from(StoreError::CodeCollision);
        assert!(!internal.is_client_error());
        assert_eq!(internal.code(), "STORAGE");
    }
}
