//! Test fixtures and helpers.
//!
//! Common setup code for integration tests and benchmarks. Everything here
//! is synchronous and deterministic given a seed; async runs go through
//! [`TestFixture::issuer`].

use attestor::{
    BundleAssembler, EvidenceBundle, Issuer, IssuerConfig, IssuerKeys, ProofSelection,
};
use attestor_checkpoint::{CheckpointEngine, CheckpointRecord, SimulatedAnchor};
use attestor_core::{
    ChainEvent, Digest, EventPayload, Keypair, ReceiptChain, RunOutcome, Timestamp,
};
use attestor_policy::{ArtifactBuilder, PolicyArtifact, SubjectIdentifier, SubjectKind};

/// 2026-01-01T00:00:00.000Z, the epoch every fixture clock starts from.
pub const FIXTURE_EPOCH_MILLIS: i64 = 1_767_225_600_000;

/// Install a test-writer tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The fixture clock, `secs` seconds after [`FIXTURE_EPOCH_MILLIS`].
pub fn at(secs: i64) -> Timestamp {
    Timestamp::from_millis(FIXTURE_EPOCH_MILLIS + secs * 1000)
        .expect("fixture clock stays within range")
}

/// A MEASUREMENT_OK payload whose measured and expected hashes agree.
pub fn measurement(index: u64) -> EventPayload {
    let hash = Digest::from_bytes([0xCC; 32]);
    EventPayload::MeasurementOk {
        measurement_index: index,
        measured_hash: hash,
        expected_hash: hash,
    }
}

/// A fixed subject: bytes hash `aa..`, metadata hash `bb..`.
pub fn subject() -> SubjectIdentifier {
    SubjectIdentifier::from_hashes(Digest::from_bytes([0xAA; 32]), Digest::from_bytes([0xBB; 32]))
}

/// A test fixture holding one key per class.
pub struct TestFixture {
    pub keys: IssuerKeys,
}

impl TestFixture {
    /// Create a new test fixture with random keys.
    pub fn new() -> Self {
        Self {
            keys: IssuerKeys::generate(),
        }
    }

    /// Create with deterministic keys. Classes get `seed`, `seed+1`, `seed+2`.
    pub fn with_seed(seed: u8) -> Self {
        Self {
            keys: IssuerKeys {
                policy_issuer: Keypair::from_seed(&[seed; 32]),
                enforcement: Keypair::from_seed(&[seed.wrapping_add(1); 32]),
                checkpoint: Keypair::from_seed(&[seed.wrapping_add(2); 32]),
            },
        }
    }

    /// An issuer over these keys with default configuration.
    pub fn issuer(&self) -> Issuer {
        self.issuer_with(IssuerConfig::default())
    }

    /// An issuer over these keys.
    pub fn issuer_with(&self, config: IssuerConfig) -> Issuer {
        Issuer::new(self.keys.clone(), config)
    }

    /// Seal a model artifact over [`subject`], valid from the fixture epoch.
    pub fn artifact(&self) -> PolicyArtifact {
        ArtifactBuilder::new(SubjectKind::Model, subject())
            .seal(&self.keys.policy_issuer, at(0))
            .expect("fixture artifact seals")
    }

    /// POLICY_LOADED for `artifact` followed by `measurements` MEASUREMENT_OK
    /// receipts, one second apart.
    pub fn chain(&self, artifact: &PolicyArtifact, measurements: u64) -> ReceiptChain {
        let mut chain = ReceiptChain::new();
        chain.append_event(
            ChainEvent::at(
                at(0),
                EventPayload::PolicyLoaded {
                    artifact_id: artifact.artifact_id.clone(),
                    policy_version: artifact.policy_version,
                    sealed_hash: artifact.sealed_hash,
                },
            ),
            &self.keys.enforcement,
        );
        for i in 1..=measurements {
            chain.append_event(
                ChainEvent::at(at(i as i64), measurement(i)),
                &self.keys.enforcement,
            );
        }
        chain
    }

    /// Append RUN_ENDED to `chain`.
    pub fn end(&self, chain: &mut ReceiptChain, outcome: RunOutcome) {
        let receipt_count = chain.len() as u64 + 1;
        let ts = at(receipt_count as i64);
        chain.append_event(
            ChainEvent::at(
                ts,
                EventPayload::RunEnded {
                    receipt_count,
                    outcome,
                },
            ),
            &self.keys.enforcement,
        );
    }

    /// Checkpoint everything in `chain` after the engine's last batch, with a
    /// simulated anchor.
    pub fn checkpoint(
        &self,
        engine: &mut CheckpointEngine,
        chain: &ReceiptChain,
    ) -> CheckpointRecord {
        let batch = chain.receipts_since(engine.last_batch_end());
        let pending = engine.prepare(batch).expect("fixture batch is contiguous");
        let now = at(chain.len() as i64 + 1);
        let proof = SimulatedAnchor::proof_for(&pending.merkle_root, now);
        engine
            .commit(pending, proof, now, &self.keys.checkpoint)
            .expect("fixture checkpoint commits")
    }

    /// A complete bundle: artifact, `measurements` receipts plus RUN_ENDED,
    /// one checkpoint over all of it, and a proof for every receipt.
    pub fn bundle(&self, measurements: u64) -> EvidenceBundle {
        let artifact = self.artifact();
        let mut chain = self.chain(&artifact, measurements);
        self.end(&mut chain, RunOutcome::Completed);
        let mut engine = CheckpointEngine::new();
        self.checkpoint(&mut engine, &chain);

        BundleAssembler::new()
            .policy_artifact(artifact)
            .receipts(chain.receipts().to_vec())
            .chain_head(chain.head().clone())
            .checkpoints(engine.checkpoints().to_vec())
            .prove(ProofSelection::All)
            .keys(self.keys.bundle_keys())
            .assemble(at(chain.len() as i64 + 2))
            .expect("fixture bundle assembles")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixtures for several independent issuers, seeded apart.
pub fn issuer_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| TestFixture::with_seed((i as u8).wrapping_mul(3).wrapping_add(1)))
        .collect()
}
