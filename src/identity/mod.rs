//! # Identity Store
//!
//! Sole source of truth for every member's verification lifecycle.
//!
//! Uniqueness of platform ID, email and verification code is enforced here,
//! atomically with the write, so concurrent entry points racing on the same
//! key resolve to exactly one winner. Records survive restarts through a
//! checksummed, fsynced journal; deletions compact it.

mod errors;
mod journal;
mod record;
mod store;

pub use errors::{StoreError, StoreResult, UniqueKey};
pub use record::{
    IdentityRecord, Lookup, NewIdentity, StateChange, StoreStats, VerificationState,
};
pub use store::{IdentityStore, IssuedCode, Replaced};
