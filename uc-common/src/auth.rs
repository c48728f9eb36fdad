//! Credential hashing and session tokens
//!
//! Passwords are stored as salted, iterated SHA-256 digests; session tokens
//! are random 256-bit values of which only the SHA-256 digest is persisted.
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions. No HTTP framework dependencies
//! (Axum, etc.) - those are in uc-server.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// SHA-256 rounds applied to salt‖password
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;

/// Upper bound on accepted password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

const SALT_BYTES: usize = 16;
const TOKEN_BYTES: usize = 32;

// ========================================
// Password hashing
// ========================================

/// Stored form of a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    /// 64 hex chars
    pub hash: String,
    /// 32 hex chars
    pub salt: String,
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = to_hex(&salt);
    let hash = derive(password, &salt);
    PasswordHash { hash, salt }
}

/// Check a password against its stored hash and salt
///
/// # Examples
///
/// ```
/// use uc_common::auth::{hash_password, verify_password};
///
/// let stored = hash_password("correct horse battery staple");
/// assert!(verify_password("correct horse battery staple", &stored.hash, &stored.salt));
/// assert!(!verify_password("Tr0ub4dor&3", &stored.hash, &stored.salt));
/// ```
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    if hash.is_empty() || salt.is_empty() {
        return false;
    }
    let calculated = derive(password, salt);
    constant_time_eq(calculated.as_bytes(), hash.as_bytes())
}

fn derive(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();

    for _ in 1..PASSWORD_HASH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(salt.as_bytes());
        digest = hasher.finalize();
    }

    format!("{:x}", digest)
}

/// Enforce password length bounds
pub fn validate_password_policy(password: &str, min_length: usize) -> Result<()> {
    let length = password.chars().count();
    if length < min_length {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters",
            min_length
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

// ========================================
// Session tokens
// ========================================

/// Generate a new bearer token (64 hex chars)
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Digest under which a token is stored
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ========================================
// Helpers
// ========================================

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Light e-mail sanity check: one `@`, non-empty local part, dotted domain
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid && email.len() <= 254 {
        Ok(email)
    } else {
        Err(Error::InvalidInput(format!("Invalid email address: {}", email)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_uses_fresh_salt() {
        let a = hash_password("password123");
        let b = hash_password("password123");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert_eq!(a.salt.len(), 32);
    }

    #[test]
    fn test_verify_rejects_empty_stored_values() {
        assert!(!verify_password("anything", "", ""));
    }

    #[test]
    fn test_token_hash_is_stable() {
        let token = generate_session_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_policy("short", 8).is_err());
        assert!(validate_password_policy("long enough", 8).is_ok());
        assert!(validate_password_policy(&"x".repeat(129), 8).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Coach@Example.COM ").unwrap(), "coach@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("a@@b.com").is_err());
    }
}
