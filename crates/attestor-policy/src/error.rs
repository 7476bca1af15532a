//! Error types for policy artifacts.

use attestor_core::{FailureKind, Timestamp};
use thiserror::Error;

/// Errors that can occur while sealing or checking a policy artifact.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy versions start at 1.
    #[error("invalid policy version: {0}")]
    InvalidVersion(u32),

    /// Expiration must fall after the effective timestamp.
    #[error("invalid validity window: effective {effective}, expiration {expiration}")]
    InvalidWindow {
        effective: Timestamp,
        expiration: Timestamp,
    },

    /// Enforcement parameters are out of range.
    #[error("invalid enforcement parameters: {0}")]
    InvalidParameters(String),

    /// The artifact is past its expiration.
    #[error("policy expired at {expiration} (now {now})")]
    Expired { expiration: Timestamp, now: Timestamp },

    /// The artifact is not yet in force.
    #[error("policy not effective until {effective} (now {now})")]
    NotYetEffective { effective: Timestamp, now: Timestamp },

    /// The artifact signature did not verify.
    #[error("policy signature invalid: {0}")]
    SignatureInvalid(String),

    /// A recomputed artifact hash does not match.
    #[error("policy hash mismatch: {0}")]
    HashMismatch(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] attestor_core::CoreError),
}

impl PolicyError {
    /// The failure kind a verifier reports for this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PolicyError::Expired { .. } | PolicyError::NotYetEffective { .. } => {
                FailureKind::PolicyExpired
            }
            PolicyError::SignatureInvalid(_) => FailureKind::SignatureInvalid,
            PolicyError::HashMismatch(_) => FailureKind::HashMismatch,
            PolicyError::InvalidVersion(_)
            | PolicyError::InvalidWindow { .. }
            | PolicyError::InvalidParameters(_)
            | PolicyError::Core(_) => FailureKind::MalformedBundle,
        }
    }
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
