//! # Verification
//!
//! The verification lifecycle of a member:
//!
//! ```text
//! (none) --email DM--> Pending --web completion--> Verified <--> Restricted
//!    \--moderator verify-----------------------------^
//! any state --reset/purge--> (deleted)
//! ```
//!
//! `machine` plans transitions as pure functions; `Orchestrator` executes
//! them against the identity store, the role synchronizer, the mailer and
//! the chat platform.

mod errors;
pub mod machine;
pub mod messages;
mod orchestrator;

pub use errors::{VerifyError, VerifyResult};
pub use orchestrator::{Orchestrator, Outcome, PurgeTarget};
