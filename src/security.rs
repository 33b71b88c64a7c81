//! Credential checks for player passwords.
//!
//! Clients send a SHA-256 hex digest of the password, and that digest is stored
//! and compared verbatim; there is no server-side salting or re-hashing. Anyone
//! holding the digest can log in, so the digest is as sensitive as the password.

use once_cell::sync::Lazy;
use regex::Regex;

static SHA256_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[0-9a-fA-F]{64}$").unwrap_or_else(|e| panic!("invalid SHA256_HEX pattern: {e}"))
});

/// True when `s` looks like a SHA-256 digest: exactly 64 hexadecimal digits, any case.
pub fn is_valid_sha256_hash(s: &str) -> bool {
    s.len() == 64 && SHA256_HEX.is_match(s)
}

/// Compare a stored digest with the presented one without short-circuiting on the first mismatch.
pub fn credentials_match(stored: &str, presented: &str) -> bool {
    let (a, b) = (stored.as_bytes(), presented.as_bytes());
    if a.len() != b.len() { return false; }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
