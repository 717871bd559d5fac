//! Content fingerprints for change detection.

use sha2::{Digest, Sha256};

/// Length in characters of a fingerprint produced by [`fingerprint`].
pub const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 of `bytes`. Deterministic and unsalted.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn deterministic_and_fixed_length() {
        let a = fingerprint(b"fn main() {}");
        assert_eq!(a, fingerprint(b"fn main() {}"));
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_ne!(a, fingerprint(b"fn main() { }"));
    }
}
