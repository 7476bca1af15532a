//! Error types for checkpointing and anchoring.

use thiserror::Error;

/// Errors from an anchoring backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    /// The backend could not be reached.
    #[error("anchor unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the commitment.
    #[error("anchor rejected: {0}")]
    Rejected(String),

    /// An anchor proof is missing required fields.
    #[error("malformed anchor proof: {0}")]
    Malformed(String),
}

/// Errors that can occur while building or proving checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A checkpoint must cover at least one receipt.
    #[error("empty checkpoint batch")]
    EmptyBatch,

    /// The batch does not start where the previous checkpoint ended, or has gaps.
    #[error("non-contiguous batch: expected sequence {expected}, got {got}")]
    NonContiguousBatch { expected: u64, got: u64 },

    /// The leaf to prove is not in the batch.
    #[error("leaf not found in batch: {0}")]
    LeafNotFound(String),

    /// Anchoring failed.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] attestor_core::CoreError),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
