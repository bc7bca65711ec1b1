//! Deterministic short identifiers derived from names.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `name`.
///
/// Used as the temp object name for attachments and as the rewritten
/// target of `cid:` references. Collisions are treated as not occurring.
pub fn fingerprint(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint("photo.jpg"), fingerprint("photo.jpg"));
        assert_ne!(fingerprint("photo.jpg"), fingerprint("photo-1.jpg"));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_is_filename_safe() {
        let fp = fingerprint("../../etc/passwd");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
