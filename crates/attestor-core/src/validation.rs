//! Chain validation: hash recomputation, linkage, sequence, and signatures.
//!
//! Every check reports into a list instead of returning early. A tampered
//! chain yields its complete error list in one pass.

use serde::{Deserialize, Serialize};

use crate::chain::ChainHead;
use crate::crypto::{role::Enforcement, PublicKey};
use crate::error::{ChainError, FailureKind};
use crate::receipt::SignedReceipt;
use crate::types::Digest;

/// Result of [`verify_chain_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// True iff `errors` is empty.
    pub valid: bool,
    /// Number of receipts examined.
    pub receipt_count: usize,
    /// Every failure found, in scan order.
    pub errors: Vec<ChainError>,
}

impl ChainReport {
    /// Errors of one kind.
    pub fn errors_of(&self, kind: FailureKind) -> impl Iterator<Item = &ChainError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

/// Verify a receipt list as one chain.
///
/// For each index: (a) recompute `payloadHash` (when the payload is present)
/// and `leafHash`; (b) check `previousLeafHash` links to the prior stored
/// `leafHash`, or genesis at index 0; (c) check `sequenceNumber == index + 1`;
/// (d) verify the signature with the key named by `keyId`. The signature is
/// only checked when the leaf hash recomputes. If `head` is given, it must
/// match the last receipt.
pub fn verify_chain_integrity(
    receipts: &[SignedReceipt],
    head: Option<&ChainHead>,
    keys: &[PublicKey<Enforcement>],
) -> ChainReport {
    let mut errors = Vec::new();
    let mut expected_prev = Digest::GENESIS;

    for (index, receipt) in receipts.iter().enumerate() {
        let seq = receipt.sequence_number;

        // (a) hashes
        if let Some(payload) = &receipt.payload {
            if payload.event_type() != receipt.event_type {
                errors.push(ChainError::new(
                    index,
                    seq,
                    FailureKind::HashMismatch,
                    format!(
                        "payload is {} but eventType is {}",
                        payload.event_type().as_str(),
                        receipt.event_type.as_str()
                    ),
                ));
            }
        }
        if let Some(recomputed) = receipt.recompute_payload_hash() {
            if !recomputed.ct_eq(&receipt.payload_hash) {
                errors.push(ChainError::new(
                    index,
                    seq,
                    FailureKind::HashMismatch,
                    format!("payloadHash: stored {}, recomputed {recomputed}", receipt.payload_hash),
                ));
            }
        }
        let leaf_ok = {
            let recomputed = receipt.recompute_leaf_hash();
            let ok = recomputed.ct_eq(&receipt.leaf_hash);
            if !ok {
                errors.push(ChainError::new(
                    index,
                    seq,
                    FailureKind::HashMismatch,
                    format!("leafHash: stored {}, recomputed {recomputed}", receipt.leaf_hash),
                ));
            }
            ok
        };

        // (b) linkage
        if !receipt.previous_leaf_hash.ct_eq(&expected_prev) {
            let reason = if index == 0 {
                "previousLeafHash: first receipt must link to genesis".to_string()
            } else {
                format!("previousLeafHash: expected {expected_prev}")
            };
            errors.push(ChainError::new(index, seq, FailureKind::ChainBroken, reason));
        }
        expected_prev = receipt.leaf_hash;

        // (c) sequence
        let expected_seq = index as u64 + 1;
        if seq != expected_seq {
            errors.push(ChainError::new(
                index,
                seq,
                FailureKind::ChainBroken,
                format!("sequenceNumber: expected {expected_seq}"),
            ));
        }

        // (d) signature
        if leaf_ok {
            if let Some(err) = check_signature(index, receipt, keys) {
                errors.push(err);
            }
        }
    }

    if let Some(head) = head {
        let actual = ChainHead::from_receipts(receipts);
        let mismatches = head.mismatches(&actual);
        if !mismatches.is_empty() {
            errors.push(ChainError::new(
                receipts.len().saturating_sub(1),
                head.head_sequence_number,
                FailureKind::ChainBroken,
                format!("chain head mismatch: {}", mismatches.join("; ")),
            ));
        }
    }

    ChainReport {
        valid: errors.is_empty(),
        receipt_count: receipts.len(),
        errors,
    }
}

fn check_signature(
    index: usize,
    receipt: &SignedReceipt,
    keys: &[PublicKey<Enforcement>],
) -> Option<ChainError> {
    let seq = receipt.sequence_number;
    let Some(key) = keys.iter().find(|k| k.key_id().ct_eq(&receipt.key_id)) else {
        return Some(ChainError::new(
            index,
            seq,
            FailureKind::SignatureInvalid,
            format!("keyId {} names no known enforcement key", receipt.key_id),
        ));
    };
    match receipt.verify_signature(key) {
        Ok(()) => None,
        Err(e) => Some(ChainError::new(
            index,
            seq,
            FailureKind::SignatureInvalid,
            format!("signature: {e}"),
        )),
    }
}

/// Result of [`verify_receipt_signatures`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureReport {
    /// Receipts whose signature verified.
    pub valid_count: usize,
    /// Receipts examined.
    pub total: usize,
    /// One entry per failing receipt.
    pub failures: Vec<ChainError>,
}

impl SignatureReport {
    /// Check if every signature verified.
    pub fn all_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verify every receipt's signature against one enforcement key.
///
/// Each receipt's `keyId` must name `key`; the signature is checked over the
/// stored leaf hash.
pub fn verify_receipt_signatures(
    receipts: &[SignedReceipt],
    key: &PublicKey<Enforcement>,
) -> SignatureReport {
    let key_id = key.key_id();
    let mut failures = Vec::new();

    for (index, receipt) in receipts.iter().enumerate() {
        let seq = receipt.sequence_number;
        if !receipt.key_id.ct_eq(&key_id) {
            failures.push(ChainError::new(
                index,
                seq,
                FailureKind::SignatureInvalid,
                format!("keyId {} does not match enforcement key {key_id}", receipt.key_id),
            ));
        } else if receipt.verify_signature(key).is_err() {
            failures.push(ChainError::new(
                index,
                seq,
                FailureKind::SignatureInvalid,
                "signature does not verify over leafHash",
            ));
        }
    }

    SignatureReport {
        valid_count: receipts.len() - failures.len(),
        total: receipts.len(),
        failures,
    }
}
