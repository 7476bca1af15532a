//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use attestor::core::{Keypair, ReceiptChain};
use attestor::policy::{ArtifactBuilder, PolicyArtifact, SubjectIdentifier, SubjectKind};
use attestor::{
    ChainEvent, Digest, EventPayload, EvidenceBundle, Issuer, IssuerConfig, IssuerKeys,
    ProofSelection, RunSession, Timestamp,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 2026-01-01T00:00:00.000Z
pub fn t0() -> Timestamp {
    Timestamp::from_millis(1_767_225_600_000).unwrap()
}

pub fn at(secs: i64) -> Timestamp {
    t0().plus_secs(secs).unwrap()
}

pub fn keys() -> IssuerKeys {
    IssuerKeys {
        policy_issuer: Keypair::from_seed(&[0x11; 32]),
        enforcement: Keypair::from_seed(&[0x22; 32]),
        checkpoint: Keypair::from_seed(&[0x33; 32]),
    }
}

pub fn issuer() -> Issuer {
    Issuer::new(keys(), IssuerConfig::default())
}

/// Subject hashes `64×'a'` and `64×'b'`.
pub fn subject() -> SubjectIdentifier {
    SubjectIdentifier::from_hashes(
        Digest::from_hex(&"a".repeat(64)).unwrap(),
        Digest::from_hex(&"b".repeat(64)).unwrap(),
    )
}

pub fn builder() -> ArtifactBuilder {
    ArtifactBuilder::new(SubjectKind::Model, subject())
}

pub fn measurement(index: u64) -> EventPayload {
    EventPayload::MeasurementOk {
        measurement_index: index,
        measured_hash: Digest::from_hex(&"c".repeat(64)).unwrap(),
        expected_hash: Digest::from_hex(&"c".repeat(64)).unwrap(),
    }
}

/// POLICY_LOADED followed by `measurements` MEASUREMENT_OK receipts.
pub fn chain_for(artifact: &PolicyArtifact, measurements: u64) -> ReceiptChain {
    let key = keys().enforcement;
    let mut chain = ReceiptChain::new();
    chain.append_event(
        ChainEvent::at(
            t0(),
            EventPayload::PolicyLoaded {
                artifact_id: artifact.artifact_id.clone(),
                policy_version: artifact.policy_version,
                sealed_hash: artifact.sealed_hash,
            },
        ),
        &key,
    );
    for i in 1..=measurements {
        chain.append_event(ChainEvent::at(at(i as i64), measurement(i)), &key);
    }
    chain
}

/// A started run with `measurements` appended after POLICY_LOADED.
pub async fn run_with(issuer: &Issuer, measurements: u64) -> RunSession {
    let artifact = issuer.seal(builder(), t0()).unwrap();
    let run = issuer.start_run(artifact, t0()).await.unwrap();
    for i in 1..=measurements {
        run.append(ChainEvent::at(at(i as i64), measurement(i)))
            .await
            .unwrap();
    }
    run
}

/// A finalized run exported with every covered receipt proven.
pub async fn finished_bundle(issuer: &Issuer, measurements: u64) -> EvidenceBundle {
    let run = run_with(issuer, measurements).await;
    run.finalize(attestor::core::RunOutcome::Completed, at(100))
        .await
        .unwrap();
    run.export_bundle(ProofSelection::All, at(101)).await.unwrap()
}

/// Flip the last hex character of a digest.
pub fn flip(digest: &Digest) -> Digest {
    let mut hex = digest.to_hex();
    let last = if hex.ends_with('0') { "1" } else { "0" };
    hex.replace_range(63..64, last);
    Digest::from_hex(&hex).unwrap()
}
