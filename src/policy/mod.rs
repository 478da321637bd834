//! # Domain Policy
//!
//! Pure predicates deciding whether an email address may be used for
//! verification. No state, no side effects.

use std::sync::OnceLock;

use regex::Regex;

/// local-part `@` domain with at least one dot and an alphabetic TLD, ASCII only
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$";

static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn email_regex() -> Option<&'static Regex> {
    EMAIL_RE.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

/// Canonical form used for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whether `email` is a well-formed address
pub fn is_valid_format(email: &str) -> bool {
    email.is_ascii() && email_regex().map(|re| re.is_match(email)).unwrap_or(false)
}

/// Domain part of an address: everything after the final `@`
pub fn domain_of(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, domain)| domain)
}

/// Whether the domain of `email` is exactly one of `approved`, ignoring case
///
/// `approved` entries are expected lower-cased (as config validation leaves
/// them). Subdomains and suffixes do not match.
pub fn is_approved_domain(email: &str, approved: &[String]) -> bool {
    let Some(domain) = domain_of(email) else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();
    approved.iter().any(|d| *d == domain)
}
