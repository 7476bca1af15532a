//! Property tests over canonical JSON, Merkle proofs, and receipt chains.

use proptest::prelude::*;

use attestor::{OfflineVerifier, Verdict, VerifierConfig};
use attestor_checkpoint::{
    compute_merkle_root, generate_inclusion_proof_at, verify_inclusion_proof_against,
    CheckpointEngine, SimulatedAnchor,
};
use attestor_core::{
    canonicalize, verify_chain_integrity, Digest, EventPayload, Keypair, SignedReceipt, Timestamp,
};
use attestor_testkit::fixtures::{at, TestFixture};
use attestor_testkit::generators::{chain_from_params, digest, json_value, ChainParams};

fn flipped(d: &Digest) -> Digest {
    let mut bytes = *d.as_bytes();
    bytes[31] ^= 0x01;
    Digest::from_bytes(bytes)
}

/// A single receipt field to corrupt.
#[derive(Debug, Clone, Copy)]
enum Field {
    Payload,
    Timestamp,
    SequenceNumber,
    PreviousLeafHash,
    PayloadHash,
    LeafHash,
}

fn receipt_field() -> impl Strategy<Value = Field> {
    prop_oneof![
        Just(Field::Payload),
        Just(Field::Timestamp),
        Just(Field::SequenceNumber),
        Just(Field::PreviousLeafHash),
        Just(Field::PayloadHash),
        Just(Field::LeafHash),
    ]
}

/// Same variant, one value changed.
fn altered(payload: &EventPayload) -> EventPayload {
    let mut payload = payload.clone();
    match &mut payload {
        EventPayload::PolicyLoaded { policy_version, .. } => *policy_version += 1,
        EventPayload::MeasurementOk { measurement_index, .. }
        | EventPayload::DriftDetected { measurement_index, .. } => *measurement_index += 1,
        EventPayload::Enforced { reason, .. } => reason.push('!'),
        EventPayload::Checkpoint { batch_end, .. } => *batch_end += 1,
        EventPayload::RunEnded { receipt_count, .. } => *receipt_count += 1,
    }
    payload
}

fn tamper(receipt: &mut SignedReceipt, field: Field) {
    match field {
        Field::Payload => receipt.payload = receipt.payload.as_ref().map(altered),
        Field::Timestamp => {
            receipt.timestamp = receipt.timestamp.plus_millis(1).expect("in range");
        }
        Field::SequenceNumber => receipt.sequence_number += 1,
        Field::PreviousLeafHash => {
            receipt.previous_leaf_hash = flipped(&receipt.previous_leaf_hash);
        }
        Field::PayloadHash => receipt.payload_hash = flipped(&receipt.payload_hash),
        Field::LeafHash => receipt.leaf_hash = flipped(&receipt.leaf_hash),
    }
}

proptest! {
    #[test]
    fn canonicalization_is_idempotent(value in json_value()) {
        let once = canonicalize(&value);
        let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
        prop_assert_eq!(canonicalize(&reparsed), once);
    }

    #[test]
    fn canonicalization_ignores_formatting(value in json_value()) {
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        prop_assert_eq!(canonicalize(&reparsed), canonicalize(&value));
    }

    #[test]
    fn every_leaf_proves_against_root(
        leaves in prop::collection::vec(digest(), 1..40),
        pick in any::<prop::sample::Index>(),
    ) {
        let index = pick.index(leaves.len());
        let root = compute_merkle_root(&leaves);
        let proof = generate_inclusion_proof_at(index, &leaves).unwrap();
        prop_assert!(verify_inclusion_proof_against(&proof, &root));
    }

    #[test]
    fn flipped_sibling_breaks_proof(
        leaves in prop::collection::vec(digest(), 2..40),
        pick in any::<prop::sample::Index>(),
        step in any::<prop::sample::Index>(),
    ) {
        let index = pick.index(leaves.len());
        let root = compute_merkle_root(&leaves);
        let mut proof = generate_inclusion_proof_at(index, &leaves).unwrap();
        let s = step.index(proof.proof_path.len());
        proof.proof_path[s].hash = flipped(&proof.proof_path[s].hash);
        prop_assert!(!verify_inclusion_proof_against(&proof, &root));
    }

    #[test]
    fn generated_chains_verify(params: ChainParams) {
        let chain = chain_from_params(&params);
        let key = Keypair::from_seed(&params.seed).public_key();
        let report = verify_chain_integrity(chain.receipts(), Some(chain.head()), &[key]);
        prop_assert!(report.valid, "errors: {:?}", report.errors);
        prop_assert_eq!(report.receipt_count, params.events.len());
    }

    #[test]
    fn tampered_field_is_detected_at_or_after_it(
        params: ChainParams,
        pick in any::<prop::sample::Index>(),
        field in receipt_field(),
    ) {
        let chain = chain_from_params(&params);
        let key = Keypair::from_seed(&params.seed).public_key();
        let mut receipts = chain.receipts().to_vec();
        let i = pick.index(receipts.len());
        tamper(&mut receipts[i], field);

        let report = verify_chain_integrity(&receipts, Some(chain.head()), &[key]);
        prop_assert!(!report.valid);
        prop_assert!(
            report.errors.iter().any(|e| e.index >= i),
            "{:?} at {} gave {:?}", field, i, report.errors
        );
    }

    #[test]
    fn checkpoint_proves_every_receipt(params: ChainParams) {
        let fixture = TestFixture::with_seed(0x40);
        let chain = chain_from_params(&params);
        let mut engine = CheckpointEngine::new();
        let record = fixture.checkpoint(&mut engine, &chain);
        prop_assert!(record.anchor_proof.is_simulated());

        for receipt in chain.receipts() {
            let proof = record.inclusion_proof(chain.receipts(), receipt.sequence_number).unwrap();
            prop_assert!(verify_inclusion_proof_against(&proof, &record.merkle_root));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Changing one receipt never improves the verdict.
    #[test]
    fn tampering_never_improves_verdict(
        measurements in 1u64..6,
        pick in any::<prop::sample::Index>(),
        field in receipt_field(),
    ) {
        let fixture = TestFixture::with_seed(0x50);
        let bundle = fixture.bundle(measurements);
        let verifier = OfflineVerifier::new(VerifierConfig::default());
        let clean = verifier.verify(&bundle, at(60));
        prop_assert_eq!(clean.verdict, Verdict::PassWithCaveats);

        let mut tampered = bundle.clone();
        let i = pick.index(tampered.receipts.len());
        tamper(&mut tampered.receipts[i], field);
        let report = verifier.verify(&tampered, at(60));
        prop_assert_eq!(report.verdict, Verdict::Fail);
        prop_assert!(report.verdict.severity() >= clean.verdict.severity());
    }
}

#[test]
fn simulated_anchor_is_deterministic() {
    let root = compute_merkle_root(&[Digest::from_bytes([7; 32])]);
    let ts = Timestamp::from_millis(0).unwrap();
    assert_eq!(
        SimulatedAnchor::proof_for(&root, ts),
        SimulatedAnchor::proof_for(&root, ts)
    );
}
