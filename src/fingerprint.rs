//! Stable record identity used for "already shown?" checks.
//!
//! The hash covers the timestamp, the role, and a bounded prefix of the
//! content. Two records that agree on all three collide; with the default
//! prefix that means long messages sharing a timestamp, role and opening
//! 100 bytes are treated as one. Pass a prefix of `0` to hash the full body.

use sha2::{Digest, Sha256};

use crate::types::Role;
use crate::util_text::truncate_at_char_boundary;

/// Default number of content bytes folded into a fingerprint.
pub const DEFAULT_PREFIX_BYTES: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Hash(u64),
    /// The record has no usable ordering key and cannot take part in dedup.
    Unfingerprintable,
}

impl Fingerprint {
    pub fn is_valid(&self) -> bool {
        matches!(self, Fingerprint::Hash(_))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fingerprint::Hash(h) => write!(f, "{h:016x}"),
            Fingerprint::Unfingerprintable => write!(f, "<unfingerprintable>"),
        }
    }
}

pub fn fingerprint(
    timestamp: Option<i64>,
    role: Role,
    content: &str,
    prefix_bytes: usize,
) -> Fingerprint {
    let Some(ts) = timestamp else {
        return Fingerprint::Unfingerprintable;
    };

    let sample = if prefix_bytes == 0 {
        content
    } else {
        truncate_at_char_boundary(content, prefix_bytes)
    };

    let mut hasher = Sha256::new();
    hasher.update(ts.to_be_bytes());
    hasher.update([role.tag()]);
    hasher.update((sample.len() as u64).to_be_bytes());
    hasher.update(sample.as_bytes());
    let digest = hasher.finalize();

    let mut folded = [0u8; 8];
    folded.copy_from_slice(&digest[..8]);
    Fingerprint::Hash(u64::from_be_bytes(folded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = fingerprint(Some(10), Role::Primary, "hello", DEFAULT_PREFIX_BYTES);
        let b = fingerprint(Some(10), Role::Primary, "hello", DEFAULT_PREFIX_BYTES);
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn each_component_changes_identity() {
        let base = fingerprint(Some(10), Role::Primary, "hello", DEFAULT_PREFIX_BYTES);
        assert_ne!(base, fingerprint(Some(11), Role::Primary, "hello", DEFAULT_PREFIX_BYTES));
        assert_ne!(base, fingerprint(Some(10), Role::Secondary, "hello", DEFAULT_PREFIX_BYTES));
        assert_ne!(base, fingerprint(Some(10), Role::Primary, "hellO", DEFAULT_PREFIX_BYTES));
    }

    #[test]
    fn missing_timestamp_is_sentinel() {
        let fp = fingerprint(None, Role::Primary, "anything", DEFAULT_PREFIX_BYTES);
        assert_eq!(fp, Fingerprint::Unfingerprintable);
        assert!(!fp.is_valid());
    }

    #[test]
    fn shared_prefix_collides_unless_full_content() {
        let long_a = format!("{}A", "x".repeat(200));
        let long_b = format!("{}B", "x".repeat(200));
        assert_eq!(
            fingerprint(Some(1), Role::Secondary, &long_a, DEFAULT_PREFIX_BYTES),
            fingerprint(Some(1), Role::Secondary, &long_b, DEFAULT_PREFIX_BYTES),
        );
        assert_ne!(
            fingerprint(Some(1), Role::Secondary, &long_a, 0),
            fingerprint(Some(1), Role::Secondary, &long_b, 0),
        );
    }
}
