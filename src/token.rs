//! Per-repository access token generation.
//!
//! Tokens are opaque identifiers minted once when a repository row is first
//! created and never rotated by the sync engine. They hash fresh OS entropy
//! together with the remote repository id, so two repositories created in the
//! same instant still receive distinct tokens.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generates an opaque 64-character hex token for a repository.
pub fn generate_repo_token(github_id: i64) -> String {
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(entropy);
    hasher.update(github_id.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_hex_sha256_digest() {
        let token = generate_repo_token(1000);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique_per_call() {
        // Same repo id, fresh entropy: tokens must still differ
        let a = generate_repo_token(42);
        let b = generate_repo_token(42);
        assert_ne!(a, b);
    }
}
