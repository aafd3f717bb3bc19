//! Stable fingerprints of comparison artifacts.
//!
//! Two kinds of fingerprint are produced:
//!
//! - **Structural** (`canonical_hash_hex`): xxHash64 over canonical JSON.
//!   Used for segment sequences, alignment maps, configs and comparisons.
//! - **Content** (`text_fingerprint`): SHA-256 over the UTF-8 text. Used to
//!   identify the shared text buffer in comparison reports.
//!
//! ## Stability
//!
//! Hashed types serialize fields in declaration order and sequences in index
//! order. Maps that end up in a hash are `BTreeMap`s, never `HashMap`s.

use serde::Serialize;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh64::xxh64;

/// JSON bytes of `value`, identical for equal inputs.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// xxHash64 of the canonical bytes.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// [`canonical_hash`] as 16 hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// SHA-256 of a text, as 64 lowercase hex characters.
///
/// The text is hashed verbatim. Two annotations only share segment offsets
/// when their texts are identical, so no normalization is applied.
pub fn text_fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    #[test]
    fn test_hash_ignores_insertion_order() {
        let a: BTreeMap<&str, &str> = [("p1", "Alice"), ("p2", "Bob")].into_iter().collect();
        let b: BTreeMap<&str, &str> = [("p2", "Bob"), ("p1", "Alice")].into_iter().collect();

        assert_eq!(canonical_hash(&a), canonical_hash(&b));
        assert_eq!(canonical_hash_hex(&a).len(), 16);
    }

    #[test]
    fn test_hash_distinguishes_offsets() {
        assert_ne!(canonical_hash_hex(&(0i64, 5i64)), canonical_hash_hex(&(0i64, 6i64)));
    }

    #[test]
    fn test_text_fingerprint_known_value() {
        assert_eq!(
            text_fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_text_fingerprint_is_whitespace_sensitive() {
        assert_ne!(text_fingerprint("a b"), text_fingerprint("a  b"));
    }
}
