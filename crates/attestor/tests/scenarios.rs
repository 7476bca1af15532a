//! End-to-end scenarios: issue, export, and verify offline.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use attestor::checkpoint::{verify_inclusion_proof_against, Anchor, AnchorError, AnchorProof};
use attestor::core::{role::Enforcement, verify_chain_integrity, EventType, Keypair, RunOutcome};
use attestor::{
    parse_bundle, read_dir, serialize_bundle, write_dir, AttestorError, ChainEvent, Digest,
    FailureKind, Issuer, IssuerConfig, OfflineVerifier, ProofSelection, SourceEvent, StepName,
    StepStatus, Timestamp, Verdict, VerifierConfig,
};
use common::*;

struct EthereumAnchor;

#[async_trait]
impl Anchor for EthereumAnchor {
    async fn anchor(&self, root: &Digest, at: Timestamp) -> Result<AnchorProof, AnchorError> {
        Ok(AnchorProof::Ethereum {
            transaction_hash: format!("0x{}", root.to_hex()),
            block_number: 19_000_000,
            chain_id: 1,
            anchored_timestamp: at,
        })
    }

    fn network(&self) -> &'static str {
        "ETHEREUM"
    }
}

struct DownAnchor;

#[async_trait]
impl Anchor for DownAnchor {
    async fn anchor(&self, _root: &Digest, _at: Timestamp) -> Result<AnchorProof, AnchorError> {
        Err(AnchorError::Unavailable("gateway timeout".into()))
    }

    fn network(&self) -> &'static str {
        "ARWEAVE"
    }
}

fn verifier() -> OfflineVerifier {
    OfflineVerifier::default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario A: a clean three-receipt chain
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scenario_a_clean_chain() {
    init_tracing();
    let artifact = issuer().seal(builder(), t0()).unwrap();
    let chain = chain_for(&artifact, 2);

    let kinds: Vec<_> = chain.receipts().iter().map(|r| r.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::PolicyLoaded,
            EventType::MeasurementOk,
            EventType::MeasurementOk
        ]
    );

    let key = keys().enforcement.public_key();
    let report = verify_chain_integrity(chain.receipts(), Some(chain.head()), &[key]);
    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert_eq!(chain.head().receipt_count, 3);
    assert!(chain.receipts()[0].previous_leaf_hash.is_genesis());
}

#[tokio::test]
async fn scenario_a_bundle_without_checkpoints_has_caveat() {
    let issuer = issuer();
    let run = run_with(&issuer, 2).await;
    let bundle = run.export_bundle(ProofSelection::None, at(10)).await.unwrap();

    let report = verifier().verify(&bundle, at(20));
    assert_eq!(report.verdict, Verdict::PassWithCaveats);
    assert_eq!(
        report.step(StepName::MerkleProofs).unwrap().status,
        StepStatus::Skipped
    );
    let anchor = report.step(StepName::CheckpointAnchor).unwrap();
    assert_eq!(anchor.status, StepStatus::Skipped);
    assert_eq!(anchor.caveats[0].kind, FailureKind::AnchorUnverifiable);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario B: one flipped leaf hash
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scenario_b_flipped_leaf_hash() {
    let artifact = issuer().seal(builder(), t0()).unwrap();
    let chain = chain_for(&artifact, 3);
    let mut receipts = chain.receipts().to_vec();
    receipts[2].leaf_hash = flip(&receipts[2].leaf_hash);

    let key = keys().enforcement.public_key();
    let report = verify_chain_integrity(&receipts, None, &[key]);
    assert!(!report.valid);
    let mismatches: Vec<_> = report.errors_of(FailureKind::HashMismatch).collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].sequence, 3);
    assert_eq!(mismatches[0].index, 2);
}

#[tokio::test]
async fn scenario_b_bundle_fails() {
    let mut bundle = finished_bundle(&issuer(), 3).await;
    bundle.receipts[2].leaf_hash = flip(&bundle.receipts[2].leaf_hash);

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);

    let chain = report.step(StepName::ChainIntegrity).unwrap();
    assert_eq!(chain.status, StepStatus::Invalid);
    let mismatches: Vec<_> = chain
        .failures
        .iter()
        .filter(|f| f.kind == FailureKind::HashMismatch)
        .collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].sequence, Some(3));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario C: five-leaf checkpoint
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_c_five_leaf_checkpoint() {
    let issuer = issuer();
    let run = run_with(&issuer, 4).await;
    let record = run.checkpoint(at(10)).await.unwrap().unwrap();
    assert_eq!((record.batch_start, record.batch_end, record.leaf_count), (1, 5, 5));

    let bundle = run
        .export_bundle(ProofSelection::of(1..=5), at(11))
        .await
        .unwrap();
    assert_eq!(bundle.inclusion_proofs.len(), 5);
    for proof in &bundle.inclusion_proofs {
        assert_eq!(proof.checkpoint_reference, record.checkpoint_id);
        assert!(verify_inclusion_proof_against(proof, &record.merkle_root));
    }
    let third = &bundle.inclusion_proofs[2];
    assert_eq!(third.event_sequence, 3);
    assert_eq!(third.event_leaf_hash, bundle.receipts[2].leaf_hash);

    let report = verifier().verify(&bundle, at(20));
    assert_eq!(
        report.step(StepName::MerkleProofs).unwrap().status,
        StepStatus::Valid
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario D: validity window
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_d_expiration() {
    let issuer = issuer();
    let expiration = at(3600);
    let artifact = issuer.seal(builder().expires(expiration), t0()).unwrap();
    let run = issuer.start_run(artifact, t0()).await.unwrap();
    run.finalize(RunOutcome::Completed, at(5)).await.unwrap();
    let bundle = run.export_bundle(ProofSelection::All, at(6)).await.unwrap();

    let before = verifier().verify(&bundle, expiration.plus_secs(-1).unwrap());
    assert!(before.verdict.is_pass());
    assert_eq!(
        before.step(StepName::PolicySignature).unwrap().status,
        StepStatus::Valid
    );

    let after = verifier().verify(&bundle, expiration.plus_secs(1).unwrap());
    assert_eq!(after.verdict, Verdict::Fail);
    let policy = after.step(StepName::PolicySignature).unwrap();
    assert_eq!(policy.status, StepStatus::Invalid);
    assert_eq!(policy.failures[0].kind, FailureKind::PolicyExpired);
}

// ─────────────────────────────────────────────────────────────────────────────
// Verdicts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn simulated_anchor_passes_with_caveats() {
    let bundle = finished_bundle(&issuer(), 3).await;
    let report = verifier().verify(&bundle, at(200));

    assert_eq!(report.verdict, Verdict::PassWithCaveats);
    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Valid));
    assert!(report
        .caveats()
        .all(|c| c.kind == FailureKind::AnchorUnverifiable));
    assert_eq!(report.bundle_hash, Some(bundle.content_hash()));
}

#[tokio::test]
async fn real_anchor_passes_clean() {
    let issuer = issuer().with_anchor(Arc::new(EthereumAnchor));
    let bundle = finished_bundle(&issuer, 3).await;
    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.caveats().count(), 0);
}

#[tokio::test]
async fn simulated_anchor_rejected_when_disallowed() {
    let bundle = finished_bundle(&issuer(), 2).await;
    let strict = OfflineVerifier::new(VerifierConfig {
        allow_simulated_anchor: false,
        ..VerifierConfig::default()
    });
    let report = strict.verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let step = report.step(StepName::CheckpointAnchor).unwrap();
    assert_eq!(step.failures[0].kind, FailureKind::AnchorUnverifiable);
}

#[tokio::test]
async fn adding_failure_only_moves_toward_fail() {
    let bundle = finished_bundle(&issuer(), 2).await;
    let baseline = verifier().verify(&bundle, at(200));
    assert_eq!(baseline.verdict, Verdict::PassWithCaveats);

    let mut broken = bundle.clone();
    broken.checkpoint_references[0].merkle_root = flip(&broken.checkpoint_references[0].merkle_root);
    let report = verifier().verify(&broken, at(200));
    assert!(report.verdict.severity() >= baseline.verdict.severity());
    assert_eq!(report.verdict, Verdict::Fail);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tampering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tampered_artifact_fails_policy_step() {
    let mut bundle = finished_bundle(&issuer(), 2).await;
    bundle.policy_artifact.issuer_identifier = "mallory".into();

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let step = report.step(StepName::PolicySignature).unwrap();
    assert_eq!(step.failures[0].kind, FailureKind::SignatureInvalid);
}

#[tokio::test]
async fn swapped_artifact_breaks_policy_binding() {
    let issuer = issuer();
    let mut bundle = finished_bundle(&issuer, 2).await;
    bundle.policy_artifact = issuer.seal(builder(), t0()).unwrap();

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(
        report.step(StepName::PolicySignature).unwrap().status,
        StepStatus::Valid
    );
    let chain = report.step(StepName::ChainIntegrity).unwrap();
    assert!(chain
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::ChainBroken && f.sequence == Some(1)));
}

#[tokio::test]
async fn wrong_enforcement_key_fails_signatures() {
    let mut bundle = finished_bundle(&issuer(), 2).await;
    let stranger = Keypair::<Enforcement>::from_seed(&[0x99; 32]);
    bundle.public_keys.enforcement = stranger.public_key().to_info();

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let step = report.step(StepName::ReceiptSignatures).unwrap();
    assert_eq!(step.failures.len(), bundle.receipts.len());
    assert!(step.details.starts_with("0/"));
}

#[tokio::test]
async fn key_of_wrong_class_rejected() {
    let mut bundle = finished_bundle(&issuer(), 2).await;
    bundle.public_keys.checkpoint = bundle.public_keys.enforcement.clone();

    let report = verifier().verify(&bundle, at(200));
    let step = report.step(StepName::CheckpointAnchor).unwrap();
    assert_eq!(step.status, StepStatus::Invalid);
    assert!(step.failures[0].detail.contains("checkpoint key"));
}

#[tokio::test]
async fn truncated_chain_detected_by_head() {
    let mut bundle = finished_bundle(&issuer(), 3).await;
    bundle.receipts.pop();

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let chain = report.step(StepName::ChainIntegrity).unwrap();
    assert!(chain
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::ChainBroken && f.detail.contains("chain head")));
}

#[tokio::test]
async fn forged_inclusion_proof_fails() {
    let mut bundle = finished_bundle(&issuer(), 3).await;
    let step = &mut bundle.inclusion_proofs[1].proof_path[0];
    step.hash = flip(&step.hash);

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let merkle = report.step(StepName::MerkleProofs).unwrap();
    assert_eq!(merkle.failures.len(), 1);
    assert_eq!(merkle.failures[0].kind, FailureKind::HashMismatch);
    assert_eq!(merkle.failures[0].sequence, Some(2));
}

#[tokio::test]
async fn proof_with_unknown_checkpoint_fails() {
    let mut bundle = finished_bundle(&issuer(), 1).await;
    bundle.inclusion_proofs[0].checkpoint_reference = "ckpt_0000000000000000".into();

    let report = verifier().verify(&bundle, at(200));
    let merkle = report.step(StepName::MerkleProofs).unwrap();
    assert_eq!(merkle.failures[0].kind, FailureKind::MalformedBundle);
}

#[tokio::test]
async fn malformed_anchor_is_invalid() {
    let mut bundle = finished_bundle(&issuer(), 1).await;
    bundle.checkpoint_references[0].anchor_proof = AnchorProof::Simulated {
        transaction_id: String::new(),
        anchored_timestamp: at(100),
    };

    let report = verifier().verify(&bundle, at(200));
    let step = report.step(StepName::CheckpointAnchor).unwrap();
    assert!(step
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::MalformedBundle));
    // The anchor change also invalidates the checkpoint signature.
    assert!(step
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::SignatureInvalid));
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing and transport
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn serialized_bundle_verifies_identically() {
    let bundle = finished_bundle(&issuer(), 3).await;
    let text = serialize_bundle(&bundle);
    assert_eq!(parse_bundle(&text).unwrap(), bundle);

    let from_bytes = verifier().verify_bytes(text.as_bytes(), at(200));
    let direct = verifier().verify(&bundle, at(200));
    assert_eq!(from_bytes, direct);
}

#[tokio::test]
async fn directory_layout_roundtrip() -> anyhow::Result<()> {
    let bundle = finished_bundle(&issuer(), 3).await;
    let dir = tempfile::tempdir()?;
    write_dir(&bundle, dir.path())?;

    let loaded = read_dir(dir.path())?;
    assert_eq!(loaded, bundle);
    assert!(loaded.manifest_mismatches().is_empty());
    assert_eq!(verifier().verify(&loaded, at(200)).verdict, Verdict::PassWithCaveats);
    Ok(())
}

#[tokio::test]
async fn artifact_without_bundle_is_malformed() {
    let bundle = finished_bundle(&issuer(), 1).await;
    let mut value = serde_json::to_value(&bundle).unwrap();
    value["receipts"] = serde_json::json!("garbage");
    let bytes = serde_json::to_vec(&value).unwrap();

    let report = verifier().verify_bytes(&bytes, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.failures[0].kind, FailureKind::MalformedBundle);
    assert_eq!(report.artifact_id.as_deref(), Some(bundle.policy_artifact.artifact_id.as_str()));
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn crafted_checkpoint_range_fails() {
    let bundle = finished_bundle(&issuer(), 2).await;
    let mut value = serde_json::to_value(&bundle).unwrap();
    value["checkpointReferences"][0]["batchStart"] = serde_json::json!(0);
    value["checkpointReferences"][0]["batchEnd"] = serde_json::json!(u64::MAX);
    let bytes = serde_json::to_vec(&value).unwrap();

    let report = verifier().verify_bytes(&bytes, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    let step = report.step(StepName::CheckpointAnchor).unwrap();
    assert_eq!(step.status, StepStatus::Invalid);
    assert!(step.failures.iter().any(|f| f.kind == FailureKind::ChainBroken));
}

#[tokio::test]
async fn fields_added_after_signing_are_malformed() {
    let bundle = finished_bundle(&issuer(), 2).await;
    let clean = serde_json::to_value(&bundle).unwrap();
    let artifact_id = bundle.policy_artifact.artifact_id.as_str();

    let mut injected = Vec::new();
    let mut value = clean.clone();
    value["policyArtifact"]["approvedBy"] = serde_json::json!("someone else");
    injected.push(value);
    let mut value = clean.clone();
    value["receipts"][1]["payload"]["injected"] = serde_json::json!("unsigned");
    injected.push(value);
    let mut value = clean.clone();
    value["checkpointReferences"][0]["anchorProof"]["confirmations"] = serde_json::json!(64);
    injected.push(value);
    let mut value = clean;
    value["chainHead"]["note"] = serde_json::json!("x");
    injected.push(value);

    for value in injected {
        let bytes = serde_json::to_vec(&value).unwrap();
        let report = verifier().verify_bytes(&bytes, at(200));
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.failures[0].kind, FailureKind::MalformedBundle);
        assert_eq!(report.artifact_id.as_deref(), Some(artifact_id));
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Pending));
    }
}

#[test]
fn no_artifact_is_not_found() {
    let report = verifier().verify_bytes(br#"{"bundleVersion":"1.0"}"#, t0());
    assert_eq!(report.verdict, Verdict::NotFound);

    let report = verifier().verify_bytes(br#"{"policyArtifact":{"artifactId":7}}"#, t0());
    assert_eq!(report.verdict, Verdict::NotFound);
}

#[tokio::test]
async fn receipt_limit_is_enforced() {
    let bundle = finished_bundle(&issuer(), 3).await;
    let limited = OfflineVerifier::new(VerifierConfig {
        max_receipts: 2,
        ..VerifierConfig::default()
    });
    let report = limited.verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.failures[0].kind, FailureKind::MalformedBundle);
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn redacted_bundle_still_verifies() {
    let issuer = issuer();
    let run = run_with(&issuer, 3).await;
    run.finalize(RunOutcome::Completed, at(50)).await.unwrap();
    let receipts = run.receipts().await;
    let bundle = attestor::BundleAssembler::new()
        .policy_artifact(run.artifact().clone())
        .receipts(receipts)
        .checkpoints(run.checkpoints().await)
        .keys(issuer.keys().bundle_keys())
        .redact_payloads(true)
        .assemble(at(51))
        .unwrap();

    assert!(bundle.receipts.iter().all(|r| r.payload.is_none()));
    let text = serialize_bundle(&bundle);
    assert!(!text.contains("\"payload\":"));
    assert_eq!(
        verifier().verify_bytes(text.as_bytes(), at(200)).verdict,
        Verdict::PassWithCaveats
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_verification_matches_sequential() {
    let bundle = finished_bundle(&issuer(), 6).await;
    let sequential = verifier().verify(&bundle, at(200));
    let parallel = verifier().verify_parallel(Arc::new(bundle), at(200)).await;
    assert_eq!(parallel, sequential);

    let names: Vec<_> = parallel.steps.iter().map(|s| s.name).collect();
    assert_eq!(names, StepName::ALL.to_vec());
}

#[tokio::test]
async fn interval_checkpoints_verify() {
    let issuer = Issuer::new(
        keys(),
        IssuerConfig {
            checkpoint_every: Some(2),
            ..IssuerConfig::default()
        },
    );
    let bundle = finished_bundle(&issuer, 5).await;
    assert!(bundle.checkpoint_references.len() > 2);
    assert!(bundle
        .receipts
        .iter()
        .any(|r| r.event_type == EventType::Checkpoint));

    let report = verifier().verify(&bundle, at(200));
    assert_eq!(report.verdict, Verdict::PassWithCaveats);
    assert_eq!(bundle.inclusion_proofs.len(), bundle.receipts.len());
}

#[tokio::test]
async fn source_events_flow_into_bundle() {
    let issuer = issuer();
    let run = run_with(&issuer, 0).await;
    for seq in 1..=3u64 {
        let event = SourceEvent {
            event_type: "DRIFT_DETECTED".into(),
            sequence_number: seq,
            timestamp: at(seq as i64),
            data: serde_json::json!({
                "measurementIndex": seq,
                "measuredHash": "d".repeat(64),
                "expectedHash": "c".repeat(64),
                "severity": "HIGH",
            }),
        };
        run.ingest_source_event(event).await.unwrap();
    }
    let err = run
        .ingest_source_event(SourceEvent {
            event_type: "MEASUREMENT_OK".into(),
            sequence_number: 9,
            timestamp: at(9),
            data: serde_json::Value::Null,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AttestorError::OutOfOrderEvent { expected: 4, got: 9 }));

    run.finalize(RunOutcome::Terminated, at(10)).await.unwrap();
    let bundle = run.export_bundle(ProofSelection::All, at(11)).await.unwrap();
    assert_eq!(bundle.receipts.len(), 5);
    assert!(verifier().verify(&bundle, at(20)).verdict.is_pass());
}

#[tokio::test]
async fn anchor_failure_surfaces() {
    let issuer = issuer().with_anchor(Arc::new(DownAnchor));
    let run = run_with(&issuer, 1).await;
    let err = run.checkpoint(at(5)).await.unwrap_err();
    assert!(matches!(err, AttestorError::Anchor(AnchorError::Unavailable(_))));
    assert!(run.checkpoints().await.is_empty());

    // The run continues; nothing was half-committed.
    run.append(ChainEvent::at(at(6), measurement(2))).await.unwrap();
    assert_eq!(run.head().await.receipt_count, 3);
}
