//! Identity store errors

use std::io;

use thiserror::Error;

use super::record::VerificationState;

/// Result type for identity store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Unique key that a conflicting write collided on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    PlatformId,
    Email,
    Code,
}

impl UniqueKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueKey::PlatformId => "platform_id",
            UniqueKey::Email => "email",
            UniqueKey::Code => "verification_code",
        }
    }
}

/// Identity store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live record matches the lookup
    #[error("Identity record not found")]
    NotFound,

    /// A unique key is already taken by a live record
    #[error("Unique constraint violated on {}", .0.as_str())]
    Conflict(UniqueKey),

    /// Guarded transition found the record in a different state
    #[error("Record is {actual}, expected {expected}")]
    StateMismatch {
        expected: VerificationState,
        actual: VerificationState,
    },

    /// Guarded transition found a different team or code than expected
    #[error("Record changed concurrently: {0}")]
    Stale(&'static str),

    /// A freshly generated code collided with a live one
    ///
    /// With a 256-bit CSPRNG this indicates a broken random source.
    #[error("Verification code collision: random source is broken")]
    CodeCollision,

    /// Journal failed checksum or framing validation
    #[error("Journal corruption at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    /// Journal I/O failed
    #[error("Journal I/O failed: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Record could not be (de)serialized
    #[error("Record encoding failed: {0}")]
    Encoding(String),

    /// A failed append could not be cut back off the journal
    #[error("Journal is unusable after a failed write; restart required")]
    JournalFailed,

    /// The store was opened for inspection only
    #[error("Identity store is read-only")]
    ReadOnly,

    /// A blocking store task did not complete
    #[error("Store task failed: {0}")]
    Task(String),

    /// A store lock was poisoned by a panicking writer
    #[error("Identity store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error signals storage failure rather than a lost race or bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::CodeCollision
                | StoreError::Corruption { .. }
                | StoreError::Io { .. }
                | StoreError::Encoding(_)
                | StoreError::JournalFailed
                | StoreError::ReadOnly
                | StoreError::Task(_)
                | StoreError::Poisoned
        )
    }
}
