//! Snapshot fingerprints.
//!
//! Snapshot texts are produced deterministically (ordered records, stable
//! float formatting), so equal constructions yield equal texts. A fingerprint
//! is the xxh64 hash of that text and is used for saved-state tracking and
//! for logging which state a rebuild produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Hash of a snapshot text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotFingerprint(pub u64);

impl SnapshotFingerprint {
    /// Hex representation.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for SnapshotFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the fingerprint of a snapshot text.
pub fn fingerprint(text: &str) -> SnapshotFingerprint {
    SnapshotFingerprint(xxh64(text.as_bytes(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        assert_eq!(fingerprint("a = 5"), fingerprint("a = 5"));
        assert_ne!(fingerprint("a = 5"), fingerprint("a = 6"));
    }

    #[test]
    fn test_hex_width() {
        assert_eq!(SnapshotFingerprint(0xab).to_hex(), "00000000000000ab");
    }
}
