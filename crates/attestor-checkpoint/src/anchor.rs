//! Anchoring: committing a checkpoint root to an external immutable store.
//!
//! Real networks are out of scope for the kernel. The [`Anchor`] trait is the
//! seam for them; [`SimulatedAnchor`] is what ships. A bundle carries the
//! resulting [`AnchorProof`] as static data and the verifier never goes online
//! to check it.

use async_trait::async_trait;
use attestor_core::{hash_canonical, Digest, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AnchorError;

/// Proof that a root was anchored, keyed by `network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "network",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum AnchorProof {
    /// No real immutable store; always a verification caveat.
    Simulated {
        transaction_id: String,
        anchored_timestamp: Timestamp,
    },
    Arweave {
        transaction_id: String,
        block_height: u64,
        anchored_timestamp: Timestamp,
    },
    Ethereum {
        transaction_hash: String,
        block_number: u64,
        chain_id: u64,
        anchored_timestamp: Timestamp,
    },
}

impl AnchorProof {
    /// Wire name of the network.
    pub fn network(&self) -> &'static str {
        match self {
            AnchorProof::Simulated { .. } => "SIMULATED",
            AnchorProof::Arweave { .. } => "ARWEAVE",
            AnchorProof::Ethereum { .. } => "ETHEREUM",
        }
    }

    /// Check if this anchor is simulated.
    pub fn is_simulated(&self) -> bool {
        matches!(self, AnchorProof::Simulated { .. })
    }

    /// When the anchor was recorded.
    pub fn anchored_timestamp(&self) -> &Timestamp {
        match self {
            AnchorProof::Simulated {
                anchored_timestamp, ..
            }
            | AnchorProof::Arweave {
                anchored_timestamp, ..
            }
            | AnchorProof::Ethereum {
                anchored_timestamp, ..
            } => anchored_timestamp,
        }
    }

    /// The network's transaction reference.
    pub fn transaction_ref(&self) -> &str {
        match self {
            AnchorProof::Simulated { transaction_id, .. }
            | AnchorProof::Arweave { transaction_id, .. } => transaction_id,
            AnchorProof::Ethereum {
                transaction_hash, ..
            } => transaction_hash,
        }
    }

    /// Check the proof is structurally complete for its network.
    ///
    /// This never contacts the network.
    pub fn validate_structure(&self) -> Result<(), AnchorError> {
        match self {
            AnchorProof::Simulated { transaction_id, .. } => {
                if transaction_id.is_empty() {
                    return Err(AnchorError::Malformed("empty transactionId".into()));
                }
            }
            AnchorProof::Arweave { transaction_id, .. } => {
                // Arweave ids are 32 bytes in unpadded base64url.
                let well_formed = transaction_id.len() == 43
                    && transaction_id
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
                if !well_formed {
                    return Err(AnchorError::Malformed(format!(
                        "arweave transactionId {transaction_id:?}"
                    )));
                }
            }
            AnchorProof::Ethereum {
                transaction_hash,
                chain_id,
                ..
            } => {
                let well_formed = transaction_hash.len() == 66
                    && transaction_hash.starts_with("0x")
                    && transaction_hash[2..].bytes().all(|b| b.is_ascii_hexdigit());
                if !well_formed {
                    return Err(AnchorError::Malformed(format!(
                        "ethereum transactionHash {transaction_hash:?}"
                    )));
                }
                if *chain_id == 0 {
                    return Err(AnchorError::Malformed("ethereum chainId 0".into()));
                }
            }
        }
        Ok(())
    }
}

/// A backend that anchors Merkle roots.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Anchor: Send + Sync {
    /// Anchor `root` and return the proof.
    async fn anchor(&self, root: &Digest, at: Timestamp) -> Result<AnchorProof, AnchorError>;

    /// Wire name of the network this backend writes to.
    fn network(&self) -> &'static str;
}

/// Anchor that records nothing externally.
///
/// The transaction id is derived from the root and time, so the same
/// request always yields the same proof.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedAnchor;

impl SimulatedAnchor {
    /// Create a simulated anchor.
    pub fn new() -> Self {
        Self
    }

    /// The proof this anchor returns for `root` at `at`.
    pub fn proof_for(root: &Digest, at: Timestamp) -> AnchorProof {
        let digest = hash_canonical(&json!({ "merkleRoot": root, "anchoredTimestamp": at }));
        AnchorProof::Simulated {
            transaction_id: format!("sim_{}", &digest.to_hex()[..32]),
            anchored_timestamp: at,
        }
    }
}

#[async_trait]
impl Anchor for SimulatedAnchor {
    async fn anchor(&self, root: &Digest, at: Timestamp) -> Result<AnchorProof, AnchorError> {
        Ok(Self::proof_for(root, at))
    }

    fn network(&self) -> &'static str {
        "SIMULATED"
    }
}
