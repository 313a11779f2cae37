//! Salted, iterated SHA-256 password hashing.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 16;
const HASH_ROUNDS: u32 = 10_000;

/// Hex-encoded password digest plus the salt it was derived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    PasswordHash {
        hash: derive(password, &salt),
        salt,
    }
}

/// Checks `password` against a stored digest in constant time.
pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    let candidate = derive(password, &stored.salt);
    constant_time_eq(candidate.as_bytes(), stored.hash.as_bytes())
}

fn derive(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..HASH_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }
    hex::encode(digest)
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};

    #[test]
    fn verifies_matching_password_only() {
        let stored = hash_password("correct horse 1");
        assert!(verify_password("correct horse 1", &stored));
        assert!(!verify_password("correct horse 2", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let first = hash_password("same-password1");
        let second = hash_password("same-password1");
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.hash, second.hash);
        assert_eq!(first.hash.len(), 64);
    }
}
