//! # Verification Codes
//!
//! Generation and at-rest hashing of single-use verification codes.
//!
//! Codes are 256-bit values from the OS CSPRNG, URL-safe base64 encoded so
//! they can travel in a query string. Only the SHA-256 digest is persisted.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a verification code
pub const CODE_BYTES: usize = 32;

/// Generate a fresh verification code
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Digest of a code as stored and indexed
pub fn code_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().as_bytes());
    let result = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_generation() {
        let code1 = generate_code();
        let code2 = generate_code();

        assert_ne!(code1, code2);
        // base64 of 32 bytes without padding
        assert_eq!(code1.len(), 43);
        assert!(code1
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_code_digest() {
        let code = generate_code();
        let digest = code_digest(&code);

        assert_ne!(code, digest);
        assert_eq!(digest, code_digest(&code));
        assert_eq!(digest, code_digest(&format!(" {} ", code)));
        assert_ne!(digest, code_digest(&generate_code()));
    }
}
