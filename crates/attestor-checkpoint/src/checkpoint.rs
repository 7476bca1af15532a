//! Checkpoints: signed Merkle commitments over contiguous receipt ranges.
//!
//! Checkpoint *n* covers `[batchStart, batchEnd]` where `batchStart` is one
//! past checkpoint *n-1*'s `batchEnd`; the first starts at 1. Creation is
//! split into [`CheckpointEngine::prepare`] (snapshot and root) and
//! [`CheckpointEngine::commit`] (anchor proof and signature) so a caller can
//! anchor the root in between.

use attestor_core::{
    canonical_json_without, hash_canonical,
    role::Checkpoint,
    CoreError, Digest, KeyId, Keypair, PublicKey, Signature, SignedReceipt, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::anchor::AnchorProof;
use crate::error::{CheckpointError, Result};
use crate::merkle::{build_proof, compute_merkle_root, InclusionProof};

/// Prefix of checkpoint identifiers.
pub const CHECKPOINT_ID_PREFIX: &str = "ckpt_";

/// A signed checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckpointRecord {
    pub checkpoint_id: String,
    pub merkle_root: Digest,
    pub batch_start: u64,
    pub batch_end: u64,
    pub leaf_count: u64,
    pub created_timestamp: Timestamp,
    pub anchor_proof: AnchorProof,
    pub key_id: KeyId,
    /// Checkpoint-key signature over every other field.
    pub signature: Signature,
}

/// Derive a checkpoint id from its root and range.
pub fn derive_checkpoint_id(merkle_root: &Digest, batch_start: u64, batch_end: u64) -> String {
    let digest = hash_canonical(&json!({
        "merkleRoot": merkle_root,
        "batchStart": batch_start,
        "batchEnd": batch_end,
    }));
    format!("{CHECKPOINT_ID_PREFIX}{}", &digest.to_hex()[..16])
}

/// Leaf hashes of a receipt batch, in order.
pub fn batch_leaves(receipts: &[SignedReceipt]) -> Vec<Digest> {
    receipts.iter().map(|r| r.leaf_hash).collect()
}

impl CheckpointRecord {
    /// The exact bytes the checkpoint key signs.
    pub fn signing_bytes(&self) -> Vec<u8> {
        canonical_json_without(self, "signature").into_bytes()
    }

    /// Verify the checkpoint signature.
    pub fn verify_signature(&self, key: &PublicKey<Checkpoint>) -> std::result::Result<(), CoreError> {
        if !key.key_id().ct_eq(&self.key_id) {
            return Err(CoreError::KeyIdMismatch {
                declared: self.key_id.to_hex(),
                derived: key.key_id().to_hex(),
            });
        }
        key.verify(&self.signing_bytes(), &self.signature)
    }

    /// Check if `sequence` falls inside this checkpoint.
    pub fn covers(&self, sequence: u64) -> bool {
        self.batch_start <= sequence && sequence <= self.batch_end
    }

    /// Slice the receipts this checkpoint covers out of a full chain.
    pub fn batch_of<'a>(&self, receipts: &'a [SignedReceipt]) -> Option<&'a [SignedReceipt]> {
        let start = usize::try_from(self.batch_start.checked_sub(1)?).ok()?;
        let end = usize::try_from(self.batch_end).ok()?;
        receipts.get(start..end)
    }

    /// Recompute the root from a full chain and compare.
    pub fn matches_receipts(&self, receipts: &[SignedReceipt]) -> bool {
        match self.batch_of(receipts) {
            Some(batch) => compute_merkle_root(&batch_leaves(batch)).ct_eq(&self.merkle_root),
            None => false,
        }
    }

    /// Prove the receipt at `sequence` against this checkpoint's root.
    ///
    /// `receipts` is the full chain, indexed by sequence number.
    pub fn inclusion_proof(
        &self,
        receipts: &[SignedReceipt],
        sequence: u64,
    ) -> Result<InclusionProof> {
        if !self.covers(sequence) {
            return Err(CheckpointError::LeafNotFound(format!(
                "sequence {sequence} outside {}..={}",
                self.batch_start, self.batch_end
            )));
        }
        let batch = self.batch_of(receipts).ok_or_else(|| {
            CheckpointError::LeafNotFound(format!(
                "chain of {} receipts does not cover checkpoint {}",
                receipts.len(),
                self.checkpoint_id
            ))
        })?;
        let index = (sequence - self.batch_start) as usize;
        build_proof(
            index,
            &batch_leaves(batch),
            sequence,
            self.checkpoint_id.clone(),
        )
    }
}

/// A snapshotted batch awaiting its anchor proof and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheckpoint {
    pub merkle_root: Digest,
    pub batch_start: u64,
    pub batch_end: u64,
    pub leaf_count: u64,
}

/// Tracks which sequence numbers have been checkpointed.
#[derive(Debug, Clone, Default)]
pub struct CheckpointEngine {
    last_batch_end: u64,
    checkpoints: Vec<CheckpointRecord>,
}

impl CheckpointEngine {
    /// Create an engine with nothing checkpointed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from existing checkpoints, which must be contiguous from 1.
    pub fn resume(checkpoints: Vec<CheckpointRecord>) -> Result<Self> {
        if let Some(err) = check_contiguity(&checkpoints).into_iter().next() {
            return Err(err);
        }
        Ok(Self {
            last_batch_end: checkpoints.last().map_or(0, |c| c.batch_end),
            checkpoints,
        })
    }

    /// Last sequence number covered by a checkpoint, 0 if none.
    pub fn last_batch_end(&self) -> u64 {
        self.last_batch_end
    }

    /// All checkpoints in order.
    pub fn checkpoints(&self) -> &[CheckpointRecord] {
        &self.checkpoints
    }

    /// The checkpoint covering `sequence`, if any.
    pub fn covering(&self, sequence: u64) -> Option<&CheckpointRecord> {
        self.checkpoints.iter().find(|c| c.covers(sequence))
    }

    /// Snapshot a batch and compute its root.
    ///
    /// The batch must be non-empty, contiguous, and start right after the
    /// last checkpoint.
    pub fn prepare(&self, receipts: &[SignedReceipt]) -> Result<PendingCheckpoint> {
        let first = receipts.first().ok_or(CheckpointError::EmptyBatch)?;
        let mut expected = self.last_batch_end.saturating_add(1);
        for receipt in receipts {
            if receipt.sequence_number != expected {
                return Err(CheckpointError::NonContiguousBatch {
                    expected,
                    got: receipt.sequence_number,
                });
            }
            expected = expected.saturating_add(1);
        }
        Ok(PendingCheckpoint {
            merkle_root: compute_merkle_root(&batch_leaves(receipts)),
            batch_start: first.sequence_number,
            batch_end: receipts.last().map_or(first.sequence_number, |r| r.sequence_number),
            leaf_count: receipts.len() as u64,
        })
    }

    /// Attach the anchor proof, sign, and record the checkpoint.
    pub fn commit(
        &mut self,
        pending: PendingCheckpoint,
        anchor_proof: AnchorProof,
        now: Timestamp,
        keypair: &Keypair<Checkpoint>,
    ) -> Result<CheckpointRecord> {
        let expected = self.last_batch_end.saturating_add(1);
        if pending.batch_start != expected {
            return Err(CheckpointError::NonContiguousBatch {
                expected,
                got: pending.batch_start,
            });
        }

        let mut record = CheckpointRecord {
            checkpoint_id: derive_checkpoint_id(
                &pending.merkle_root,
                pending.batch_start,
                pending.batch_end,
            ),
            merkle_root: pending.merkle_root,
            batch_start: pending.batch_start,
            batch_end: pending.batch_end,
            leaf_count: pending.leaf_count,
            created_timestamp: now,
            anchor_proof,
            key_id: keypair.key_id(),
            signature: Signature::ZERO,
        };
        record.signature = keypair.sign(&record.signing_bytes());

        tracing::info!(
            checkpoint_id = %record.checkpoint_id,
            batch_start = record.batch_start,
            batch_end = record.batch_end,
            network = record.anchor_proof.network(),
            "created checkpoint"
        );

        self.last_batch_end = record.batch_end;
        self.checkpoints.push(record.clone());
        Ok(record)
    }

    /// Prepare and commit in one step.
    pub fn create_checkpoint(
        &mut self,
        receipts: &[SignedReceipt],
        anchor_proof: AnchorProof,
        now: Timestamp,
        keypair: &Keypair<Checkpoint>,
    ) -> Result<CheckpointRecord> {
        let pending = self.prepare(receipts)?;
        self.commit(pending, anchor_proof, now, keypair)
    }
}

/// Check that checkpoints cover contiguous, non-overlapping ranges from 1.
///
/// Returns every violation found.
pub fn check_contiguity(checkpoints: &[CheckpointRecord]) -> Vec<CheckpointError> {
    let mut errors = Vec::new();
    let mut expected = 1;
    for record in checkpoints {
        if record.batch_start != expected {
            errors.push(CheckpointError::NonContiguousBatch {
                expected,
                got: record.batch_start,
            });
        }
        let span = record
            .batch_end
            .checked_sub(record.batch_start)
            .and_then(|d| d.checked_add(1));
        if span != Some(record.leaf_count) {
            errors.push(CheckpointError::NonContiguousBatch {
                expected: record.batch_start,
                got: record.batch_end,
            });
        }
        expected = record.batch_end.saturating_add(1);
    }
    errors
}
