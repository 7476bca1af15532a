//! Error types for the Attestor facade.

use attestor_checkpoint::{AnchorError, CheckpointError};
use attestor_core::CoreError;
use attestor_policy::PolicyError;
use thiserror::Error;

/// Errors while assembling, serializing, or loading an evidence bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The bundle is structurally unusable.
    #[error("malformed bundle: {0}")]
    Malformed(String),

    /// A file does not match its manifest entry.
    #[error("manifest mismatch for {path}: {reason}")]
    ManifestMismatch { path: String, reason: String },

    /// A receipt was requested for proof but no checkpoint covers it.
    #[error("no checkpoint covers sequence {0}")]
    MissingProofTarget(u64),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Checkpoint error while generating proofs.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Errors that can occur during issuer-side operations.
#[derive(Debug, Error)]
pub enum AttestorError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Policy error.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Anchoring error.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Bundle error.
    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// A source event arrived out of order.
    #[error("out-of-order source event: expected sequence {expected}, got {got}")]
    OutOfOrderEvent { expected: u64, got: u64 },

    /// The run has already ended.
    #[error("run already finalized")]
    Finalized,

    /// `RUN_ENDED` is recorded but the final checkpoint is outstanding.
    #[error("run ended; retry finalize to checkpoint the remainder")]
    RunEnded,
}

/// Result type for Attestor operations.
pub type Result<T> = std::result::Result<T, AttestorError>;
