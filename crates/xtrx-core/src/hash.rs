//! Content-addressed hashing of composition inputs and outputs.
//!
//! Values are hashed through their JSON serialization, so two values hash
//! equal exactly when they serialize equal.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Compute the SHA-256 content hash of any serializable value.
pub fn content_hash<T: Serialize>(value: &T) -> Result<ContentHash, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hasher.finalize().into())
}

/// Format a content hash as a hex string.
pub fn hash_hex(hash: &ContentHash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_hash() {
        let h1 = content_hash(&("limesdr", 125_000_000u64)).unwrap();
        let h2 = content_hash(&("limesdr", 125_000_000u64)).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_inputs_different_hash() {
        let h1 = content_hash(&"fairwaves_cs").unwrap();
        let h2 = content_hash(&"fairwaves_pro").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_hex_format() {
        let h = content_hash(&0x22_0000u64).unwrap();
        let hex = hash_hex(&h);
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
