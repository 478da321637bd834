//! Chat platform errors

use thiserror::Error;

/// Result type for outbound platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failures reported by a chat platform adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The gateway connection is down
    #[error("Chat platform not connected")]
    NotConnected,

    /// The member is not (or no longer) in the community space
    #[error("Member {0} not found")]
    MemberNotFound(String),

    /// Granting a role the member already holds
    #[error("Role {0} already granted")]
    RoleAlreadyGranted(String),

    /// Revoking a role the member does not hold
    #[error("Role {0} not held")]
    RoleNotHeld(String),

    /// The member does not accept direct messages
    #[error("Direct messages closed for {0}")]
    DirectMessagesClosed(String),

    /// Any other rejection from the platform API
    #[error("Platform rejected request: {0}")]
    Rejected(String),
}

impl PlatformError {
    /// Whether the error means the requested role state already holds
    pub fn is_already_applied(&self) -> bool {
        matches!(
            self,
            PlatformError::RoleAlreadyGranted(_) | PlatformError::RoleNotHeld(_)
        )
    }
}
