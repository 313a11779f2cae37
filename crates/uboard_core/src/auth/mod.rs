//! Credential primitives.
//!
//! # Responsibility
//! - Hash and verify passwords.
//! - Mint opaque bearer tokens and derive their storage digests.
//!
//! # Invariants
//! - Plaintext passwords and tokens are never persisted.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, PasswordHash};
pub use token::{generate_token, token_digest};
