//! Password reset token generation and at-rest hashing

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Length of a generated reset token (alphanumeric, ~238 bits of entropy)
pub const RESET_TOKEN_LEN: usize = 40;

/// Reset token generator
pub struct ResetTokenGenerator;

impl ResetTokenGenerator {
    /// Generate a new reset token
    pub fn generate() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    /// Hash a reset token for storage using SHA-256
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}
