//! crates/study_buddy_core/src/fingerprint.rs
//!
//! Content fingerprints: a deterministic SHA-256 digest of submitted text,
//! used as the shared cache key for generated flashcards. Two submissions
//! with identical text always map to the same fingerprint and therefore the
//! same cache entry, across all users.

use sha2::{Digest, Sha256};

/// A deterministic digest of submitted text. Pure value type; no identity
/// beyond its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Computes the fingerprint of the given text: the lowercase hex SHA-256
    /// digest of its UTF-8 bytes, exactly as submitted. Infallible for any
    /// input; callers are expected to reject empty text before getting here.
    pub fn of(text: &str) -> Self {
        let hash = Sha256::digest(text.as_bytes());
        Self(format!("{hash:x}"))
    }

    /// Reconstructs a fingerprint from an already-stored hex digest.
    pub fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_identical_text() {
        let a = ContentFingerprint::of("Photosynthesis converts light to energy.");
        let b = ContentFingerprint::of("Photosynthesis converts light to energy.");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_for_distinct_text() {
        let a = ContentFingerprint::of("mitochondria");
        let b = ContentFingerprint::of("chloroplast");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let fp = ContentFingerprint::of("hello world");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_input_produces_known_digest() {
        // SHA-256 of the empty string; the orchestrator rejects empty text
        // before fingerprinting, but the function itself never fails.
        assert_eq!(
            ContentFingerprint::of("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn whitespace_is_significant() {
        let a = ContentFingerprint::of("some text");
        let b = ContentFingerprint::of("some text ");
        assert_ne!(a, b, "normalization is the caller's job, not the digest's");
    }
}
