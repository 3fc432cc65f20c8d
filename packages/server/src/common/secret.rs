//! Submission secrets: generation, hashing, and verification.
//!
//! Secrets are never stored in plaintext. Each row carries a random salt and
//! the hex SHA-256 of `salt:secret`. Verification recomputes the digest and
//! compares in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const MIN_SECRET_LEN: usize = 8;
pub const MAX_SECRET_LEN: usize = 128;

/// Salted digest of a secret, as persisted alongside the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedSecret {
    pub hash: String,
    pub salt: String,
}

impl HashedSecret {
    /// Hash `secret` under a fresh random salt.
    pub fn new(secret: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        Self {
            hash: digest(&salt, secret),
            salt,
        }
    }
}

/// Generate a secret for submitters that did not supply one.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Check a provided secret against the stored digest.
pub fn verify_secret(provided: &str, salt: &str, expected_hash: &str) -> bool {
    // Slices of unequal length compare as not equal
    digest(salt, provided)
        .as_bytes()
        .ct_eq(expected_hash.as_bytes())
        .into()
}

fn digest(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
