//! Error types for the Attestor core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::KeyClass;

/// Core errors from key handling, decoding, and signature checks.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("key class mismatch: expected {expected}, got {got}")]
    KeyClassMismatch { expected: KeyClass, got: KeyClass },

    #[error("key id mismatch: declared {declared}, derived {derived}")]
    KeyIdMismatch { declared: String, derived: String },

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed digest: {0}")]
    MalformedDigest(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("malformed key encoding: {0}")]
    MalformedKey(String),

    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// The kind of a verification failure.
///
/// These are deterministic facts about given bytes, never transient faults,
/// so none of them is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// A recomputed hash differs from the stored one.
    HashMismatch,
    /// A cryptographic signature did not verify.
    SignatureInvalid,
    /// A previous-hash link or sequence number is discontinuous.
    ChainBroken,
    /// `now` is outside the artifact's validity window.
    PolicyExpired,
    /// The bundle is structurally unusable.
    MalformedBundle,
    /// An anchor is present but cannot be checked independently.
    AnchorUnverifiable,
}

impl FailureKind {
    /// Caveats downgrade a verdict without failing it.
    pub fn is_caveat(self) -> bool {
        matches!(self, FailureKind::AnchorUnverifiable)
    }
}

/// One chain integrity failure, located by index and sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("receipt {index} (seq {sequence}): {kind:?}: {reason}")]
pub struct ChainError {
    /// Zero-based position in the receipt list.
    pub index: usize,
    /// The sequence number stored in the receipt at that position.
    pub sequence: u64,
    /// The failure kind.
    pub kind: FailureKind,
    /// Human-readable reason naming the offending field.
    pub reason: String,
}

impl ChainError {
    pub fn new(index: usize, sequence: u64, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            index,
            sequence,
            kind,
            reason: reason.into(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
