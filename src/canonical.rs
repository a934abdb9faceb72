//! Canonical serialization for deterministic hashing.
//!
//! Fingerprints of paths, traversal options and configuration are computed
//! from a canonical JSON encoding so they are stable across runs and
//! processes.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data
//! - Positions serialize as normalised `n/d` strings

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// This function produces deterministic output for the same input.
/// Every type in this crate serializes with string map keys, so encoding
/// cannot fail for them.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Path, Position};

    #[test]
    fn test_determinism() {
        let p = Path::parse("[:staves 0 :voices 1]").unwrap();

        let h1 = canonical_hash(&p);
        let h2 = canonical_hash(&p.clone());
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_normalised_positions_hash_equal() {
        assert_eq!(
            canonical_hash_hex(&Position::new(2, 4)),
            canonical_hash_hex(&Position::new(1, 2))
        );
    }
}
