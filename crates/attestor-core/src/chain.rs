//! Chain: the single-writer, append-only log of a run's receipts.
//!
//! A [`ReceiptChain`] owns `last_leaf_hash` and `next_sequence` and is the
//! only place receipts are created. Appending takes `&mut self`, so the
//! read-modify-write of those two fields is exclusive by construction; callers
//! that share a chain across tasks wrap it in a mutex.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::{role::Enforcement, Keypair};
use crate::error::{ChainError, CoreError, FailureKind};
use crate::receipt::{receipt_id_for, EventPayload, ReceiptBuilder, SignedReceipt};
use crate::types::{Digest, Timestamp};

/// Denormalized pointer to the end of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainHead {
    /// Number of receipts in the chain.
    pub receipt_count: u64,
    /// Sequence number of the last receipt, 0 when empty.
    pub head_sequence_number: u64,
    /// Leaf hash of the last receipt, genesis when empty.
    pub head_leaf_hash: Digest,
    /// Derived id of the last receipt.
    pub head_receipt_id: Option<String>,
}

impl ChainHead {
    /// The head of an empty chain.
    pub fn empty() -> Self {
        Self {
            receipt_count: 0,
            head_sequence_number: 0,
            head_leaf_hash: Digest::GENESIS,
            head_receipt_id: None,
        }
    }

    /// Compute the head a list of receipts implies.
    pub fn from_receipts(receipts: &[SignedReceipt]) -> Self {
        match receipts.last() {
            Some(last) => Self {
                receipt_count: receipts.len() as u64,
                head_sequence_number: last.sequence_number,
                head_leaf_hash: last.leaf_hash,
                head_receipt_id: Some(last.receipt_id()),
            },
            None => Self::empty(),
        }
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.receipt_count == 0
    }

    /// Describe every field where `self` disagrees with `other`.
    pub fn mismatches(&self, other: &ChainHead) -> Vec<String> {
        let mut out = Vec::new();
        if self.receipt_count != other.receipt_count {
            out.push(format!(
                "receiptCount {} != {}",
                self.receipt_count, other.receipt_count
            ));
        }
        if self.head_sequence_number != other.head_sequence_number {
            out.push(format!(
                "headSequenceNumber {} != {}",
                self.head_sequence_number, other.head_sequence_number
            ));
        }
        if !self.head_leaf_hash.ct_eq(&other.head_leaf_hash) {
            out.push(format!(
                "headLeafHash {} != {}",
                self.head_leaf_hash, other.head_leaf_hash
            ));
        }
        if self.head_receipt_id != other.head_receipt_id {
            out.push(format!(
                "headReceiptId {:?} != {:?}",
                self.head_receipt_id, other.head_receipt_id
            ));
        }
        out
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::empty()
    }
}

/// An event to append: when it happened and what it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl ChainEvent {
    /// An event happening now.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Timestamp::now(),
            payload,
        }
    }

    /// An event with an explicit timestamp.
    pub fn at(timestamp: Timestamp, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }
}

/// An event as emitted by an external event source (e.g. a simulation engine).
///
/// `type` is the wire event type name and `data` the untagged payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub sequence_number: u64,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub data: Value,
}

impl TryFrom<SourceEvent> for ChainEvent {
    type Error = CoreError;

    fn try_from(event: SourceEvent) -> Result<Self, Self::Error> {
        let payload: EventPayload =
            serde_json::from_value(json!({ "eventType": event.event_type, "payload": event.data }))
                .map_err(|e| {
                    CoreError::MalformedReceipt(format!(
                        "source event {} ({}): {e}",
                        event.sequence_number, event.event_type
                    ))
                })?;
        Ok(ChainEvent::at(event.timestamp, payload))
    }
}

/// The state of one run's receipt chain.
#[derive(Debug, Clone)]
pub struct ReceiptChain {
    last_leaf_hash: Digest,
    next_sequence: u64,
    receipts: Vec<SignedReceipt>,
    head: ChainHead,
}

impl ReceiptChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            last_leaf_hash: Digest::GENESIS,
            next_sequence: 1,
            receipts: Vec::new(),
            head: ChainHead::empty(),
        }
    }

    /// Rebuild chain state from previously issued receipts.
    ///
    /// Checks sequence contiguity and previous-hash linkage only; signatures
    /// are the verifier's concern.
    pub fn resume(receipts: Vec<SignedReceipt>) -> Result<Self, ChainError> {
        let mut expected_prev = Digest::GENESIS;
        for (index, receipt) in receipts.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if receipt.sequence_number != expected_seq {
                return Err(ChainError::new(
                    index,
                    receipt.sequence_number,
                    FailureKind::ChainBroken,
                    format!("sequenceNumber: expected {expected_seq}"),
                ));
            }
            if !receipt.previous_leaf_hash.ct_eq(&expected_prev) {
                return Err(ChainError::new(
                    index,
                    receipt.sequence_number,
                    FailureKind::ChainBroken,
                    "previousLeafHash does not link to prior leafHash",
                ));
            }
            expected_prev = receipt.leaf_hash;
        }

        let head = ChainHead::from_receipts(&receipts);
        Ok(Self {
            last_leaf_hash: expected_prev,
            next_sequence: receipts.len() as u64 + 1,
            receipts,
            head,
        })
    }

    /// Build, sign, and append a receipt for `event`.
    pub fn append_event(
        &mut self,
        event: ChainEvent,
        keypair: &Keypair<Enforcement>,
    ) -> SignedReceipt {
        let receipt = ReceiptBuilder::new(self.next_sequence, event.payload)
            .previous(self.last_leaf_hash)
            .timestamp(event.timestamp)
            .sign(keypair);

        tracing::debug!(
            seq = receipt.sequence_number,
            event_type = receipt.event_type.as_str(),
            receipt_id = %receipt.receipt_id(),
            "appended receipt"
        );

        self.last_leaf_hash = receipt.leaf_hash;
        self.next_sequence += 1;
        self.head = ChainHead {
            receipt_count: self.receipts.len() as u64 + 1,
            head_sequence_number: receipt.sequence_number,
            head_leaf_hash: receipt.leaf_hash,
            head_receipt_id: Some(receipt_id_for(&receipt.leaf_hash)),
        };
        self.receipts.push(receipt.clone());
        receipt
    }

    /// The current head.
    pub fn head(&self) -> &ChainHead {
        &self.head
    }

    /// All receipts in order.
    pub fn receipts(&self) -> &[SignedReceipt] {
        &self.receipts
    }

    /// Receipts with sequence number greater than `after`.
    pub fn receipts_since(&self, after: u64) -> &[SignedReceipt] {
        let start = usize::try_from(after).unwrap_or(usize::MAX);
        self.receipts.get(start..).unwrap_or(&[])
    }

    /// Look up a receipt by sequence number.
    pub fn get(&self, sequence_number: u64) -> Option<&SignedReceipt> {
        let index = usize::try_from(sequence_number.checked_sub(1)?).ok()?;
        self.receipts.get(index)
    }

    /// Leaf hash the next receipt will link to.
    pub fn last_leaf_hash(&self) -> &Digest {
        &self.last_leaf_hash
    }

    /// Sequence number the next receipt will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of receipts.
    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    /// Check if no receipt has been appended.
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

impl Default for ReceiptChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::{EventType, RunOutcome};

    fn keypair() -> Keypair<Enforcement> {
        Keypair::from_seed(&[0x42; 32])
    }

    fn ts(offset: i64) -> Timestamp {
        Timestamp::from_millis(1_767_225_600_000 + offset).unwrap()
    }

    fn measurement(index: u64) -> EventPayload {
        EventPayload::MeasurementOk {
            measurement_index: index,
            measured_hash: Digest::from_bytes([0xaa; 32]),
            expected_hash: Digest::from_bytes([0xaa; 32]),
        }
    }

    #[test]
    fn test_empty_chain_head() {
        let chain = ReceiptChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.head(), &ChainHead::empty());
        assert_eq!(chain.head().head_leaf_hash.to_hex(), "0".repeat(64));
        assert_eq!(chain.next_sequence(), 1);
    }

    #[test]
    fn test_append_links_receipts() {
        let kp = keypair();
        let mut chain = ReceiptChain::new();

        let r1 = chain.append_event(ChainEvent::at(ts(0), measurement(0)), &kp);
        let r2 = chain.append_event(ChainEvent::at(ts(1), measurement(1)), &kp);
        let r3 = chain.append_event(ChainEvent::at(ts(2), measurement(2)), &kp);

        assert_eq!(r1.sequence_number, 1);
        assert_eq!(r1.previous_leaf_hash, Digest::GENESIS);
        assert_eq!(r2.previous_leaf_hash, r1.leaf_hash);
        assert_eq!(r3.previous_leaf_hash, r2.leaf_hash);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.next_sequence(), 4);
        assert_eq!(chain.last_leaf_hash(), &r3.leaf_hash);
    }

    #[test]
    fn test_head_tracks_last_receipt() {
        let kp = keypair();
        let mut chain = ReceiptChain::new();
        chain.append_event(ChainEvent::at(ts(0), measurement(0)), &kp);
        let last = chain.append_event(ChainEvent::at(ts(1), measurement(1)), &kp);

        let head = chain.head();
        assert_eq!(head.receipt_count, 2);
        assert_eq!(head.head_sequence_number, 2);
        assert_eq!(head.head_leaf_hash, last.leaf_hash);
        assert_eq!(head.head_receipt_id.as_deref(), Some(last.receipt_id().as_str()));
        assert_eq!(head, &ChainHead::from_receipts(chain.receipts()));
    }

    #[test]
    fn test_receipts_since() {
        let kp = keypair();
        let mut chain = ReceiptChain::new();
        for i in 0..5 {
            chain.append_event(ChainEvent::at(ts(i), measurement(i as u64)), &kp);
        }
        let since = chain.receipts_since(3);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].sequence_number, 4);
        assert!(chain.receipts_since(5).is_empty());
        assert!(chain.receipts_since(99).is_empty());
        assert_eq!(chain.get(2).map(|r| r.sequence_number), Some(2));
        assert!(chain.get(0).is_none());
    }

    #[test]
    fn test_resume_continues_chain() {
        let kp = keypair();
        let mut chain = ReceiptChain::new();
        chain.append_event(ChainEvent::at(ts(0), measurement(0)), &kp);
        chain.append_event(ChainEvent::at(ts(1), measurement(1)), &kp);

        let mut resumed = ReceiptChain::resume(chain.receipts().to_vec()).unwrap();
        assert_eq!(resumed.head(), chain.head());
        let r3 = resumed.append_event(ChainEvent::at(ts(2), measurement(2)), &kp);
        assert_eq!(r3.sequence_number, 3);
        assert_eq!(&r3.previous_leaf_hash, chain.last_leaf_hash());
    }

    #[test]
    fn test_resume_rejects_gap() {
        let kp = keypair();
        let mut chain = ReceiptChain::new();
        chain.append_event(ChainEvent::at(ts(0), measurement(0)), &kp);
        chain.append_event(ChainEvent::at(ts(1), measurement(1)), &kp);
        chain.append_event(ChainEvent::at(ts(2), measurement(2)), &kp);

        let mut receipts = chain.receipts().to_vec();
        receipts.remove(1);
        let err = ReceiptChain::resume(receipts).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.kind, FailureKind::ChainBroken);
    }

    #[test]
    fn test_source_event_conversion() {
        let source: SourceEvent = serde_json::from_value(json!({
            "type": "RUN_ENDED",
            "sequenceNumber": 9,
            "timestamp": "2026-01-01T00:00:00.000Z",
            "data": {"receiptCount": 8, "outcome": "COMPLETED"}
        }))
        .unwrap();

        let event = ChainEvent::try_from(source).unwrap();
        assert_eq!(event.payload.event_type(), EventType::RunEnded);
        assert_eq!(
            event.payload,
            EventPayload::RunEnded {
                receipt_count: 8,
                outcome: RunOutcome::Completed
            }
        );
    }

    #[test]
    fn test_source_event_unknown_type_rejected() {
        let source = SourceEvent {
            event_type: "REBOOTED".into(),
            sequence_number: 1,
            timestamp: ts(0),
            data: json!({}),
        };
        assert!(matches!(
            ChainEvent::try_from(source),
            Err(CoreError::MalformedReceipt(_))
        ));
    }
}
