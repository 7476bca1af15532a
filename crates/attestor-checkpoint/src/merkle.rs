//! Merkle trees over receipt leaf hashes.
//!
//! Parents are `SHA256(left ‖ right)` over the hex renderings. Levels are
//! paired left to right; an odd last node is paired with itself, never with
//! zero padding. Root computation and proof generation share
//! [`next_level`], so the two can not drift apart.

use attestor_core::{hash_concat, Digest};
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};

/// Which side a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

/// One step of a proof path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofStep {
    /// Side of the sibling relative to the running hash.
    pub position: Position,
    /// The sibling hash.
    pub hash: Digest,
}

/// Proof that one receipt's leaf hash is committed by a checkpoint root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InclusionProof {
    pub event_leaf_hash: Digest,
    pub event_sequence: u64,
    pub merkle_root: Digest,
    /// Siblings from leaf to root.
    pub proof_path: Vec<ProofStep>,
    /// Id of the checkpoint whose root this proof targets.
    pub checkpoint_reference: String,
}

fn parent(left: &Digest, right: &Digest) -> Digest {
    hash_concat(&[left, right])
}

/// Hash one level into the next. An odd last node pairs with itself.
fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            parent(left, right)
        })
        .collect()
}

/// Compute the Merkle root of a batch.
///
/// Empty batch: the genesis sentinel. One leaf: the leaf itself.
pub fn compute_merkle_root(leaves: &[Digest]) -> Digest {
    match leaves {
        [] => Digest::GENESIS,
        [only] => *only,
        _ => {
            let mut level = next_level(leaves);
            while level.len() > 1 {
                level = next_level(&level);
            }
            level[0]
        }
    }
}

/// Sibling path for the leaf at `index`.
fn merkle_path(index: usize, leaves: &[Digest]) -> Vec<ProofStep> {
    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let step = if idx % 2 == 0 {
            // Odd tail pairs with itself.
            let sibling = level.get(idx + 1).unwrap_or(&level[idx]);
            ProofStep {
                position: Position::Right,
                hash: *sibling,
            }
        } else {
            ProofStep {
                position: Position::Left,
                hash: level[idx - 1],
            }
        };
        path.push(step);
        level = next_level(&level);
        idx /= 2;
    }
    path
}

pub(crate) fn build_proof(
    index: usize,
    leaves: &[Digest],
    event_sequence: u64,
    checkpoint_reference: String,
) -> Result<InclusionProof> {
    let leaf = leaves.get(index).ok_or_else(|| {
        CheckpointError::LeafNotFound(format!("index {index} of {}", leaves.len()))
    })?;
    let proof = InclusionProof {
        event_leaf_hash: *leaf,
        event_sequence,
        merkle_root: compute_merkle_root(leaves),
        proof_path: merkle_path(index, leaves),
        checkpoint_reference,
    };
    tracing::debug!(
        index,
        depth = proof.proof_path.len(),
        "generated inclusion proof"
    );
    Ok(proof)
}

/// Generate a proof for the leaf at `index`.
///
/// The batch is taken to start at sequence 1; use
/// [`CheckpointRecord::inclusion_proof`](crate::CheckpointRecord::inclusion_proof)
/// to prove a receipt against a recorded checkpoint.
pub fn generate_inclusion_proof_at(index: usize, leaves: &[Digest]) -> Result<InclusionProof> {
    build_proof(index, leaves, index as u64 + 1, String::new())
}

/// Generate a proof for the first occurrence of `leaf` in the batch.
pub fn generate_inclusion_proof(leaf: &Digest, leaves: &[Digest]) -> Result<InclusionProof> {
    let index = leaves
        .iter()
        .position(|l| l.ct_eq(leaf))
        .ok_or_else(|| CheckpointError::LeafNotFound(leaf.to_hex()))?;
    generate_inclusion_proof_at(index, leaves)
}

/// Replay the path from the leaf and return the resulting root.
pub fn replay_proof(proof: &InclusionProof) -> Digest {
    proof
        .proof_path
        .iter()
        .fold(proof.event_leaf_hash, |acc, step| match step.position {
            Position::Left => parent(&step.hash, &acc),
            Position::Right => parent(&acc, &step.hash),
        })
}

/// Check that the proof's path leads to its own `merkleRoot`.
pub fn verify_inclusion_proof(proof: &InclusionProof) -> bool {
    replay_proof(proof).ct_eq(&proof.merkle_root)
}

/// Check the proof and that it targets `expected_root`.
pub fn verify_inclusion_proof_against(proof: &InclusionProof, expected_root: &Digest) -> bool {
    proof.merkle_root.ct_eq(expected_root) && verify_inclusion_proof(proof)
}
