//! Observability
//!
//! Structured, leveled logging shared by every subsystem.

mod logger;

pub use logger::{LogCapture, Logger, Severity};

use sha2::{Digest, Sha256};

/// Short, non-reversible fingerprint of a secret for log lines
///
/// Verification codes are never logged raw.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}
