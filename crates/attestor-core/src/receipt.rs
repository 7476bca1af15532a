//! Receipt: one signed, hash-linked event in a run's chain.
//!
//! A receipt is immutable once signed. Its leaf hash covers the event type,
//! sequence number, timestamp, previous leaf hash and the *hash* of the
//! payload, never the payload itself, so a receipt can be redacted (payload
//! dropped) without breaking the chain or its signature.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::{hash_canonical, to_json_value};
use crate::crypto::{role::Enforcement, KeyId, Keypair, PublicKey, Signature};
use crate::error::CoreError;
use crate::types::{Digest, Timestamp};

/// Prefix of derived receipt identifiers.
pub const RECEIPT_ID_PREFIX: &str = "rcpt_";

/// The kind of event a receipt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A policy artifact was loaded for the run.
    PolicyLoaded,
    /// A measurement matched the sealed baseline.
    MeasurementOk,
    /// A measurement diverged from the sealed baseline.
    DriftDetected,
    /// An enforcement action was taken.
    Enforced,
    /// A checkpoint was committed.
    Checkpoint,
    /// The run finished.
    RunEnded,
}

impl EventType {
    /// Wire name of the event type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PolicyLoaded => "POLICY_LOADED",
            EventType::MeasurementOk => "MEASUREMENT_OK",
            EventType::DriftDetected => "DRIFT_DETECTED",
            EventType::Enforced => "ENFORCED",
            EventType::Checkpoint => "CHECKPOINT",
            EventType::RunEnded => "RUN_ENDED",
        }
    }
}

/// Severity of a detected drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Action taken when drift is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementAction {
    /// Record and notify only.
    Alert,
    /// Isolate the subject.
    Quarantine,
    /// Refuse further use of the subject.
    Block,
    /// Stop the running subject.
    Terminate,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed,
    Terminated,
    Aborted,
}

/// Event-specific payload, keyed by event type.
///
/// Serializes adjacently tagged as `{"eventType": ..., "payload": {...}}`.
/// Only the `payload` content participates in `payloadHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "eventType",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum EventPayload {
    PolicyLoaded {
        artifact_id: String,
        policy_version: u32,
        sealed_hash: Digest,
    },
    MeasurementOk {
        measurement_index: u64,
        measured_hash: Digest,
        expected_hash: Digest,
    },
    DriftDetected {
        measurement_index: u64,
        measured_hash: Digest,
        expected_hash: Digest,
        severity: DriftSeverity,
    },
    Enforced {
        action: EnforcementAction,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drift_sequence: Option<u64>,
    },
    Checkpoint {
        checkpoint_id: String,
        merkle_root: Digest,
        batch_start: u64,
        batch_end: u64,
    },
    RunEnded {
        receipt_count: u64,
        outcome: RunOutcome,
    },
}

impl EventPayload {
    /// The event type this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PolicyLoaded { .. } => EventType::PolicyLoaded,
            EventPayload::MeasurementOk { .. } => EventType::MeasurementOk,
            EventPayload::DriftDetected { .. } => EventType::DriftDetected,
            EventPayload::Enforced { .. } => EventType::Enforced,
            EventPayload::Checkpoint { .. } => EventType::Checkpoint,
            EventPayload::RunEnded { .. } => EventType::RunEnded,
        }
    }

    /// The untagged payload content as JSON.
    pub fn content(&self) -> Value {
        match to_json_value(self) {
            Value::Object(mut map) => map.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Rebuild a payload from its event type and untagged content.
    pub fn from_content(event_type: EventType, content: Value) -> Result<Self, CoreError> {
        serde_json::from_value(json!({ "eventType": event_type, "payload": content })).map_err(
            |e| CoreError::MalformedReceipt(format!("{} payload: {e}", event_type.as_str())),
        )
    }

    /// `SHA256(canonical(content))`.
    pub fn hash(&self) -> Digest {
        hash_canonical(&self.content())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeafPreimage<'a> {
    event_type: EventType,
    sequence_number: u64,
    timestamp: &'a Timestamp,
    previous_leaf_hash: &'a Digest,
    payload_hash: &'a Digest,
}

/// Compute a receipt leaf hash from its structural fields.
pub fn compute_leaf_hash(
    event_type: EventType,
    sequence_number: u64,
    timestamp: &Timestamp,
    previous_leaf_hash: &Digest,
    payload_hash: &Digest,
) -> Digest {
    hash_canonical(&LeafPreimage {
        event_type,
        sequence_number,
        timestamp,
        previous_leaf_hash,
        payload_hash,
    })
}

/// Derive the display identifier of a receipt from its leaf hash.
pub fn receipt_id_for(leaf_hash: &Digest) -> String {
    format!("{RECEIPT_ID_PREFIX}{}", &leaf_hash.to_hex()[..16])
}

/// A signed chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ReceiptWire", into = "ReceiptWire")]
pub struct SignedReceipt {
    /// 1-based position in the chain.
    pub sequence_number: u64,
    /// Event type; must agree with the payload when present.
    pub event_type: EventType,
    /// Issuer-claimed event time.
    pub timestamp: Timestamp,
    /// Leaf hash of the preceding receipt, or genesis.
    pub previous_leaf_hash: Digest,
    /// Event payload; `None` when redacted.
    pub payload: Option<EventPayload>,
    /// Hash of the canonical payload content.
    pub payload_hash: Digest,
    /// Hash of the structural fields.
    pub leaf_hash: Digest,
    /// Enforcement-key signature over the leaf hash bytes.
    pub signature: Signature,
    /// Fingerprint of the signing key.
    pub key_id: KeyId,
}

impl SignedReceipt {
    /// Derived identifier, `rcpt_` plus the first 16 hex of the leaf hash.
    pub fn receipt_id(&self) -> String {
        receipt_id_for(&self.leaf_hash)
    }

    /// Recompute the payload hash, if the payload is present.
    pub fn recompute_payload_hash(&self) -> Option<Digest> {
        self.payload.as_ref().map(EventPayload::hash)
    }

    /// Recompute the leaf hash from the stored structural fields.
    pub fn recompute_leaf_hash(&self) -> Digest {
        compute_leaf_hash(
            self.event_type,
            self.sequence_number,
            &self.timestamp,
            &self.previous_leaf_hash,
            &self.payload_hash,
        )
    }

    /// Whether the payload has been withheld.
    pub fn is_redacted(&self) -> bool {
        self.payload.is_none()
    }

    /// A copy with the payload removed and everything else intact.
    pub fn redacted(&self) -> Self {
        Self {
            payload: None,
            ..self.clone()
        }
    }

    /// Verify the signature over the stored leaf hash.
    pub fn verify_signature(&self, key: &PublicKey<Enforcement>) -> Result<(), CoreError> {
        key.verify(self.leaf_hash.as_bytes(), &self.signature)
    }
}

/// On-the-wire shape of a receipt: flat, camelCase, payload untagged.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReceiptWire {
    sequence_number: u64,
    event_type: EventType,
    timestamp: Timestamp,
    previous_leaf_hash: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    payload_hash: Digest,
    leaf_hash: Digest,
    signature: Signature,
    key_id: KeyId,
}

impl TryFrom<ReceiptWire> for SignedReceipt {
    type Error = CoreError;

    fn try_from(wire: ReceiptWire) -> Result<Self, Self::Error> {
        let payload = wire
            .payload
            .map(|content| EventPayload::from_content(wire.event_type, content))
            .transpose()?;
        Ok(Self {
            sequence_number: wire.sequence_number,
            event_type: wire.event_type,
            timestamp: wire.timestamp,
            previous_leaf_hash: wire.previous_leaf_hash,
            payload,
            payload_hash: wire.payload_hash,
            leaf_hash: wire.leaf_hash,
            signature: wire.signature,
            key_id: wire.key_id,
        })
    }
}

impl From<SignedReceipt> for ReceiptWire {
    fn from(receipt: SignedReceipt) -> Self {
        Self {
            sequence_number: receipt.sequence_number,
            event_type: receipt.event_type,
            timestamp: receipt.timestamp,
            previous_leaf_hash: receipt.previous_leaf_hash,
            payload: receipt.payload.as_ref().map(EventPayload::content),
            payload_hash: receipt.payload_hash,
            leaf_hash: receipt.leaf_hash,
            signature: receipt.signature,
            key_id: receipt.key_id,
        }
    }
}

/// Builder for creating receipts.
pub struct ReceiptBuilder {
    sequence_number: u64,
    previous_leaf_hash: Digest,
    timestamp: Option<Timestamp>,
    payload: EventPayload,
}

impl ReceiptBuilder {
    /// Start building a receipt at the given position.
    pub fn new(sequence_number: u64, payload: EventPayload) -> Self {
        Self {
            sequence_number,
            previous_leaf_hash: Digest::GENESIS,
            timestamp: None,
            payload,
        }
    }

    /// Set the previous leaf hash (defaults to genesis).
    pub fn previous(mut self, leaf_hash: Digest) -> Self {
        self.previous_leaf_hash = leaf_hash;
        self
    }

    /// Set the timestamp (defaults to now).
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Hash, sign, and build the receipt.
    pub fn sign(self, keypair: &Keypair<Enforcement>) -> SignedReceipt {
        let timestamp = self.timestamp.unwrap_or_else(Timestamp::now);
        let event_type = self.payload.event_type();
        let payload_hash = self.payload.hash();
        let leaf_hash = compute_leaf_hash(
            event_type,
            self.sequence_number,
            &timestamp,
            &self.previous_leaf_hash,
            &payload_hash,
        );
        let signature = keypair.sign(leaf_hash.as_bytes());

        SignedReceipt {
            sequence_number: self.sequence_number,
            event_type,
            timestamp,
            previous_leaf_hash: self.previous_leaf_hash,
            payload: Some(self.payload),
            payload_hash,
            leaf_hash,
            signature,
            key_id: keypair.key_id(),
        }
    }
}
