//! # Attestor Checkpoint
//!
//! Merkle checkpoints over receipt chains.
//!
//! ## Overview
//!
//! A checkpoint batches the leaf hashes of a contiguous range of receipts
//! into a Merkle root, records an [`AnchorProof`] for that root, and is signed
//! with the checkpoint key. [`InclusionProof`]s then let a verifier confirm a
//! single receipt belongs to a checkpoint without the rest of the batch's
//! payloads.
//!
//! ## Anchoring
//!
//! Anchoring goes through the async [`Anchor`] trait. Only
//! [`SimulatedAnchor`] ships; its proofs always surface as a verification
//! caveat.

pub mod anchor;
pub mod checkpoint;
pub mod error;
pub mod merkle;

pub use anchor::{Anchor, AnchorProof, SimulatedAnchor};
pub use checkpoint::{
    batch_leaves, check_contiguity, derive_checkpoint_id, CheckpointEngine, CheckpointRecord,
    PendingCheckpoint,
};
pub use error::{AnchorError, CheckpointError, Result};
pub use merkle::{
    compute_merkle_root, generate_inclusion_proof, generate_inclusion_proof_at, replay_proof,
    verify_inclusion_proof, verify_inclusion_proof_against, InclusionProof, Position, ProofStep,
};
