//! Subjects and their identifiers.
//!
//! A subject is whatever the policy baselines: a file, a config, a model, or
//! a running process. Only its hashes ever leave the issuer.

use attestor_core::{compute_bytes_hash, hash_canonical, hash_concat, Digest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of thing a subject is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    File,
    Config,
    Model,
    Process,
}

/// The hashed identity of a subject.
///
/// `combinedHash = SHA256(bytesHash ‖ metadataHash)` over the hex renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubjectIdentifier {
    /// SHA-256 of the subject bytes.
    pub bytes_hash: Digest,
    /// SHA-256 of the canonical subject metadata.
    pub metadata_hash: Digest,
    /// Binding of the two hashes above.
    pub combined_hash: Digest,
}

impl SubjectIdentifier {
    /// Build from precomputed hashes.
    pub fn from_hashes(bytes_hash: Digest, metadata_hash: Digest) -> Self {
        let combined_hash = hash_concat(&[&bytes_hash, &metadata_hash]);
        Self {
            bytes_hash,
            metadata_hash,
            combined_hash,
        }
    }

    /// Hash raw subject bytes and metadata.
    pub fn from_subject(bytes: &[u8], metadata: &Value) -> Self {
        Self::from_hashes(compute_bytes_hash(bytes), hash_canonical(metadata))
    }

    /// Check that `combinedHash` binds the other two hashes.
    pub fn verify_combined(&self) -> bool {
        hash_concat(&[&self.bytes_hash, &self.metadata_hash]).ct_eq(&self.combined_hash)
    }
}

/// A subject held in memory by the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub kind: SubjectKind,
    pub content: Bytes,
    pub metadata: Value,
}

impl Subject {
    /// Create a subject.
    pub fn new(kind: SubjectKind, content: impl Into<Bytes>, metadata: Value) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata,
        }
    }

    /// Compute the subject's identifier.
    pub fn identifier(&self) -> SubjectIdentifier {
        SubjectIdentifier::from_subject(&self.content, &self.metadata)
    }

    /// Hash the current content, for comparing against the sealed baseline.
    pub fn measure(&self) -> Digest {
        compute_bytes_hash(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_combined_hash_rule() {
        let a = Digest::from_hex(&"a".repeat(64)).unwrap();
        let m = Digest::from_hex(&"b".repeat(64)).unwrap();
        let id = SubjectIdentifier::from_hashes(a, m);
        let expected = compute_bytes_hash(format!("{}{}", "a".repeat(64), "b".repeat(64)).as_bytes());
        assert_eq!(id.combined_hash, expected);
        assert!(id.verify_combined());
    }

    #[test]
    fn test_metadata_order_irrelevant() {
        let one = SubjectIdentifier::from_subject(b"model", &json!({"name": "m", "rev": 2}));
        let two = SubjectIdentifier::from_subject(b"model", &json!({"rev": 2, "name": "m"}));
        assert_eq!(one, two);
    }

    #[test]
    fn test_tampered_combined_detected() {
        let mut id = SubjectIdentifier::from_subject(b"x", &json!({}));
        id.bytes_hash = compute_bytes_hash(b"y");
        assert!(!id.verify_combined());
    }

    #[test]
    fn test_subject_identifier_and_measure() {
        let subject = Subject::new(SubjectKind::Config, &b"key=value"[..], json!({"path": "/etc/app"}));
        assert_eq!(subject.identifier().bytes_hash, subject.measure());
        assert_eq!(serde_json::to_value(subject.kind).unwrap(), json!("config"));
    }
}
