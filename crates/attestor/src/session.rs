//! The issuer side: sealing artifacts and running attested sessions.
//!
//! An [`Issuer`] holds the three signing keys and seals policy artifacts. A
//! [`RunSession`] is one run against one artifact: it owns the receipt chain
//! and the checkpoint engine behind a single mutex, so appends and checkpoint
//! snapshots are serialized.

use std::sync::Arc;

use attestor_checkpoint::{Anchor, CheckpointEngine, CheckpointRecord, SimulatedAnchor};
use attestor_core::{
    role::{Checkpoint, Enforcement, PolicyIssuer},
    ChainEvent, ChainHead, EventPayload, Keypair, ReceiptChain, RunOutcome, SignedReceipt,
    SourceEvent, Timestamp,
};
use attestor_policy::{
    ArtifactBuilder, PolicyArtifact, DEFAULT_ISSUER, PROTOCOL_VERSION, SCHEMA_VERSION,
};
use tokio::sync::Mutex;

use crate::bundle::{BundleAssembler, BundleKeys, EvidenceBundle, ProofSelection};
use crate::error::{AttestorError, Result};

/// Configuration for an [`Issuer`].
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Schema version stamped on sealed artifacts.
    pub schema_version: String,
    /// Protocol version stamped on sealed artifacts.
    pub protocol_version: String,
    /// Issuer identifier stamped on sealed artifacts.
    pub issuer_identifier: String,
    /// Checkpoint automatically once this many receipts are pending.
    pub checkpoint_every: Option<usize>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            issuer_identifier: DEFAULT_ISSUER.to_string(),
            checkpoint_every: None,
        }
    }
}

/// The issuer's signing keys, one per class.
#[derive(Debug, Clone)]
pub struct IssuerKeys {
    pub policy_issuer: Keypair<PolicyIssuer>,
    pub enforcement: Keypair<Enforcement>,
    pub checkpoint: Keypair<Checkpoint>,
}

impl IssuerKeys {
    /// Generate fresh keys.
    pub fn generate() -> Self {
        Self {
            policy_issuer: Keypair::generate(),
            enforcement: Keypair::generate(),
            checkpoint: Keypair::generate(),
        }
    }

    /// The public halves, as carried in a bundle.
    pub fn bundle_keys(&self) -> BundleKeys {
        BundleKeys {
            policy_issuer: self.policy_issuer.public_key().to_info(),
            enforcement: self.enforcement.public_key().to_info(),
            checkpoint: self.checkpoint.public_key().to_info(),
        }
    }
}

/// Seals artifacts and starts run sessions.
pub struct Issuer {
    keys: Arc<IssuerKeys>,
    config: IssuerConfig,
    anchor: Arc<dyn Anchor>,
}

impl Issuer {
    /// Create an issuer that anchors with [`SimulatedAnchor`].
    pub fn new(keys: IssuerKeys, config: IssuerConfig) -> Self {
        Self {
            keys: Arc::new(keys),
            config,
            anchor: Arc::new(SimulatedAnchor::new()),
        }
    }

    /// Replace the anchoring backend.
    pub fn with_anchor(mut self, anchor: Arc<dyn Anchor>) -> Self {
        self.anchor = anchor;
        self
    }

    /// The issuer's keys.
    pub fn keys(&self) -> &IssuerKeys {
        &self.keys
    }

    /// The issuer's configuration.
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artifacts
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal an artifact with this issuer's identity and versions.
    pub fn seal(&self, builder: ArtifactBuilder, now: Timestamp) -> Result<PolicyArtifact> {
        let artifact = builder
            .issuer(self.config.issuer_identifier.clone())
            .versions(
                self.config.schema_version.clone(),
                self.config.protocol_version.clone(),
            )
            .seal(&self.keys.policy_issuer, now)?;
        Ok(artifact)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a run under `artifact`.
    ///
    /// The artifact must carry this issuer's signature and be current at
    /// `now`. The first receipt is `POLICY_LOADED`.
    pub async fn start_run(&self, artifact: PolicyArtifact, now: Timestamp) -> Result<RunSession> {
        artifact.verify_signature(&self.keys.policy_issuer.public_key())?;
        artifact.check_validity(&now)?;

        let session = RunSession {
            artifact: Arc::new(artifact),
            keys: Arc::clone(&self.keys),
            anchor: Arc::clone(&self.anchor),
            checkpoint_every: self.config.checkpoint_every,
            state: Mutex::new(RunState::new()),
        };

        let loaded = EventPayload::PolicyLoaded {
            artifact_id: session.artifact.artifact_id.clone(),
            policy_version: session.artifact.policy_version,
            sealed_hash: session.artifact.sealed_hash,
        };
        session.append(ChainEvent::at(now, loaded)).await?;

        tracing::info!(
            artifact_id = %session.artifact.artifact_id,
            "started run"
        );
        Ok(session)
    }
}

struct RunState {
    chain: ReceiptChain,
    checkpoints: CheckpointEngine,
    /// Last accepted source event sequence, 0 before the first.
    last_source_sequence: u64,
    /// `RUN_ENDED` is in the chain; only `finalize` may proceed.
    ended: bool,
    finalized: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            chain: ReceiptChain::new(),
            checkpoints: CheckpointEngine::new(),
            last_source_sequence: 0,
            ended: false,
            finalized: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.finalized {
            Err(AttestorError::Finalized)
        } else if self.ended {
            Err(AttestorError::RunEnded)
        } else {
            Ok(())
        }
    }

    fn pending(&self) -> usize {
        self.chain
            .receipts_since(self.checkpoints.last_batch_end())
            .len()
    }
}

/// One attested run: a receipt chain plus its checkpoints.
///
/// All mutation goes through one mutex, so a checkpoint never batches a
/// half-appended receipt.
pub struct RunSession {
    artifact: Arc<PolicyArtifact>,
    keys: Arc<IssuerKeys>,
    anchor: Arc<dyn Anchor>,
    checkpoint_every: Option<usize>,
    state: Mutex<RunState>,
}

impl RunSession {
    /// The artifact governing this run.
    pub fn artifact(&self) -> &PolicyArtifact {
        &self.artifact
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Appends
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event and return its receipt.
    pub async fn append(&self, event: ChainEvent) -> Result<SignedReceipt> {
        let mut state = self.state.lock().await;
        self.append_locked(&mut state, event).await
    }

    /// Append an event emitted by an external source.
    ///
    /// Source sequence numbers must arrive in order starting at 1; anything
    /// else is rejected without touching the chain.
    pub async fn ingest_source_event(&self, event: SourceEvent) -> Result<SignedReceipt> {
        let mut state = self.state.lock().await;
        let expected = state.last_source_sequence + 1;
        if event.sequence_number != expected {
            tracing::warn!(
                expected,
                got = event.sequence_number,
                event_type = %event.event_type,
                "rejected out-of-order source event"
            );
            return Err(AttestorError::OutOfOrderEvent {
                expected,
                got: event.sequence_number,
            });
        }

        let source_sequence = event.sequence_number;
        let chain_event = ChainEvent::try_from(event)?;
        let receipt = self.append_locked(&mut state, chain_event).await?;
        state.last_source_sequence = source_sequence;
        Ok(receipt)
    }

    /// Once the receipt is in the chain the append has succeeded. A failed
    /// interval checkpoint is logged and retried on the next append.
    async fn append_locked(&self, state: &mut RunState, event: ChainEvent) -> Result<SignedReceipt> {
        state.check_open()?;
        let at = event.timestamp;
        let receipt = state.chain.append_event(event, &self.keys.enforcement);

        if let Some(every) = self.checkpoint_every {
            if every > 0 && state.pending() >= every {
                if let Err(e) = self.checkpoint_locked(state, at, true).await {
                    tracing::warn!(
                        sequence = receipt.sequence_number,
                        pending = state.pending(),
                        error = %e,
                        "interval checkpoint deferred"
                    );
                }
            }
        }
        Ok(receipt)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Checkpoint every receipt not yet covered.
    ///
    /// Returns `None` when nothing is pending. The checkpoint is then
    /// recorded in the chain as a `CHECKPOINT` receipt, which the next
    /// checkpoint covers.
    pub async fn checkpoint(&self, now: Timestamp) -> Result<Option<CheckpointRecord>> {
        let mut state = self.state.lock().await;
        state.check_open()?;
        self.checkpoint_locked(&mut state, now, true).await
    }

    async fn checkpoint_locked(
        &self,
        state: &mut RunState,
        now: Timestamp,
        record_in_chain: bool,
    ) -> Result<Option<CheckpointRecord>> {
        let batch = state.chain.receipts_since(state.checkpoints.last_batch_end());
        if batch.is_empty() {
            return Ok(None);
        }
        let pending = state.checkpoints.prepare(batch)?;
        let proof = self.anchor.anchor(&pending.merkle_root, now).await?;
        let record = state
            .checkpoints
            .commit(pending, proof, now, &self.keys.checkpoint)?;

        if record_in_chain {
            let payload = EventPayload::Checkpoint {
                checkpoint_id: record.checkpoint_id.clone(),
                merkle_root: record.merkle_root,
                batch_start: record.batch_start,
                batch_end: record.batch_end,
            };
            state
                .chain
                .append_event(ChainEvent::at(now, payload), &self.keys.enforcement);
        }
        Ok(Some(record))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completion
    // ─────────────────────────────────────────────────────────────────────────

    /// End the run: append `RUN_ENDED` and checkpoint the remainder.
    ///
    /// After this every receipt is covered by a checkpoint and further
    /// appends fail. If the final checkpoint fails, `RUN_ENDED` stays in the
    /// chain and a retry only checkpoints; `outcome` of the retry is ignored.
    pub async fn finalize(&self, outcome: RunOutcome, now: Timestamp) -> Result<ChainHead> {
        let mut state = self.state.lock().await;
        if state.finalized {
            return Err(AttestorError::Finalized);
        }
        if !state.ended {
            let ended = EventPayload::RunEnded {
                receipt_count: state.chain.len() as u64 + 1,
                outcome,
            };
            state
                .chain
                .append_event(ChainEvent::at(now, ended), &self.keys.enforcement);
            state.ended = true;
        }
        self.checkpoint_locked(&mut state, now, false).await?;
        state.finalized = true;

        let head = state.chain.head().clone();
        tracing::info!(
            artifact_id = %self.artifact.artifact_id,
            receipts = head.receipt_count,
            checkpoints = state.checkpoints.checkpoints().len(),
            "finalized run"
        );
        Ok(head)
    }

    /// Check if the run has ended.
    pub async fn is_finalized(&self) -> bool {
        self.state.lock().await.finalized
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The current chain head.
    pub async fn head(&self) -> ChainHead {
        self.state.lock().await.chain.head().clone()
    }

    /// A snapshot of all receipts.
    pub async fn receipts(&self) -> Vec<SignedReceipt> {
        self.state.lock().await.chain.receipts().to_vec()
    }

    /// A snapshot of all checkpoints.
    pub async fn checkpoints(&self) -> Vec<CheckpointRecord> {
        self.state.lock().await.checkpoints.checkpoints().to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    /// Export an evidence bundle proving the selected receipts.
    pub async fn export_bundle(
        &self,
        prove: ProofSelection,
        now: Timestamp,
    ) -> Result<EvidenceBundle> {
        let (receipts, head, checkpoints) = {
            let state = self.state.lock().await;
            (
                state.chain.receipts().to_vec(),
                state.chain.head().clone(),
                state.checkpoints.checkpoints().to_vec(),
            )
        };
        let bundle = BundleAssembler::new()
            .policy_artifact(self.artifact.as_ref().clone())
            .receipts(receipts)
            .chain_head(head)
            .checkpoints(checkpoints)
            .prove(prove)
            .keys(self.keys.bundle_keys())
            .assemble(now)?;
        Ok(bundle)
    }
}
