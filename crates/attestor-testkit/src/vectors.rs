//! Golden test vectors for deterministic verification.
//!
//! These vectors pin canonical encoding, leaf hashing, Merkle roots and
//! deterministic Ed25519 signatures, so an independent verifier can check it
//! computes byte-identical results. Expected values were produced by a
//! separate implementation of the same rules.

use attestor_checkpoint::compute_merkle_root;
use attestor_core::{
    canonicalize, compute_bytes_hash, hash_canonical, hash_concat, role, Digest, EventPayload,
    Keypair, ReceiptBuilder, RunOutcome, SignedReceipt, Timestamp,
};

/// Seed of the enforcement key used by the receipt vectors.
pub const ENFORCEMENT_SEED: [u8; 32] = [0x22; 32];

/// Leaf hash of the first receipt vector; the second links to it.
const FIRST_LEAF: &str = "3d167998b0daa5c281d8ebb4976a84f3562392f84c5586730ac675af3c8c9c0d";

/// A golden receipt vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for the enforcement keypair.
    pub seed: [u8; 32],
    /// Sequence number.
    pub sequence_number: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_millis: i64,
    /// Previous leaf hash (hex).
    pub previous_leaf_hash: &'static str,
    /// Event payload.
    pub payload: EventPayload,
    /// Expected payload hash (hex).
    pub expected_payload_hash: &'static str,
    /// Expected leaf hash (hex).
    pub expected_leaf_hash: &'static str,
    /// Expected signature over the leaf hash (hex).
    pub expected_signature: &'static str,
}

/// A golden digest vector: something computed, and what it must equal.
#[derive(Debug, Clone)]
pub struct DigestVector {
    pub name: &'static str,
    pub computed: Digest,
    pub expected: &'static str,
}

/// A golden key vector: seed to published fingerprint.
#[derive(Debug, Clone)]
pub struct KeyVector {
    pub name: &'static str,
    pub seed: [u8; 32],
    pub expected_public_key: &'static str,
    pub expected_key_id: &'static str,
}

fn digest(hex: &str) -> Digest {
    Digest::from_hex(hex).expect("vector digests are valid hex")
}

/// Get all golden receipt vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "genesis MEASUREMENT_OK",
            seed: ENFORCEMENT_SEED,
            sequence_number: 1,
            timestamp_millis: 1_767_225_600_000, // 2026-01-01T00:00:00.000Z
            previous_leaf_hash: "0000000000000000000000000000000000000000000000000000000000000000",
            payload: EventPayload::MeasurementOk {
                measurement_index: 0,
                measured_hash: digest(&"a".repeat(64)),
                expected_hash: digest(&"a".repeat(64)),
            },
            expected_payload_hash:
                "e821889d322beabf2d6822a97ec9d70e2d77a70703748961fb871f6d3f967d78",
            expected_leaf_hash: FIRST_LEAF,
            expected_signature: "453fca3015c8e0275470492540edb84ed41c52fa5827068a285d913fd2716c2a\
                                 1ff4d7b94863db4587c99f6084e8b5baadabdabba097b304d77423308438b80d",
        },
        GoldenVector {
            name: "linked RUN_ENDED",
            seed: ENFORCEMENT_SEED,
            sequence_number: 2,
            timestamp_millis: 1_767_225_601_500,
            previous_leaf_hash: FIRST_LEAF,
            payload: EventPayload::RunEnded {
                receipt_count: 2,
                outcome: RunOutcome::Completed,
            },
            expected_payload_hash:
                "46d149bcd4e34d39d55ec08985b725d36afd8e756490dd652c11cf10ac1dc89d",
            expected_leaf_hash: "7eec6f15daf02ccd3cf6fa3cd61e357df477df914ef8a4ef58fd81aed3d9946f",
            expected_signature: "647ac89969fd8a27d1d8e3c2a0553fc1d51e5055e9d205c59e893fa4fb1910f6\
                                 a9a8e53d79c854afc68a989a898405bc8068c9ebea19a263f2000409a91a4e0b",
        },
    ]
}

/// Input of the canonical JSON vector. Keys deliberately out of order.
pub const CANONICAL_INPUT: &str = r#"{"b": 1, "c": {"z": "é", "y": 2}, "a": [true, null, "x"]}"#;

/// Expected canonical form of [`CANONICAL_INPUT`].
pub const CANONICAL_OUTPUT: &str = r#"{"a":[true,null,"x"],"b":1,"c":{"y":2,"z":"é"}}"#;

/// Get all golden digest vectors.
pub fn digest_vectors() -> Vec<DigestVector> {
    let canonical_input: serde_json::Value =
        serde_json::from_str(CANONICAL_INPUT).expect("vector input is valid JSON");
    let leaves: Vec<Digest> = (0..3)
        .map(|i| compute_bytes_hash(format!("leaf-{i}").as_bytes()))
        .collect();

    vec![
        DigestVector {
            name: "SHA-256 of empty input",
            computed: compute_bytes_hash(b""),
            expected: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        DigestVector {
            name: "hash of canonical object",
            computed: hash_canonical(&canonical_input),
            expected: "cfa183f4b8373ff99b908f3e7d111cda8953de5035f9bf3d83b65d428ef0361c",
        },
        DigestVector {
            name: "hex concatenation of aa.. and bb..",
            computed: hash_concat(&[&digest(&"a".repeat(64)), &digest(&"b".repeat(64))]),
            expected: "fa0dafbf43f1f551e536353e9d1a942a8e86e41a0b58dfeaf264ef217f6b862a",
        },
        DigestVector {
            name: "Merkle root of three leaves",
            computed: compute_merkle_root(&leaves),
            expected: "265ff079294e0d2784c62727e50fa04e8ca20518b21f66b6502f53f54983f42e",
        },
    ]
}

/// Get all golden key vectors.
pub fn key_vectors() -> Vec<KeyVector> {
    vec![
        KeyVector {
            name: "policy issuer seed 0x11",
            seed: [0x11; 32],
            expected_public_key: "d04ab232742bb4ab3a1368bd4615e4e6d0224ab71a016baf8520a332c9778737",
            expected_key_id: "10ba682c8ad13513",
        },
        KeyVector {
            name: "enforcement seed 0x22",
            seed: ENFORCEMENT_SEED,
            expected_public_key: "a09aa5f47a6759802ff955f8dc2d2a14a5c99d23be97f864127ff9383455a4f0",
            expected_key_id: "1325b850c2871916",
        },
        KeyVector {
            name: "checkpoint seed 0x33",
            seed: [0x33; 32],
            expected_public_key: "17cb79fb2b4120f2b1ec65e4198d6e08b28e813feb01e4a400839b85e18080ce",
            expected_key_id: "6c8f8607dbe87077",
        },
    ]
}

/// Build and sign the receipt a golden vector describes.
pub fn generate_receipt_from_vector(vector: &GoldenVector) -> SignedReceipt {
    let keypair = Keypair::<role::Enforcement>::from_seed(&vector.seed);
    let timestamp =
        Timestamp::from_millis(vector.timestamp_millis).expect("vector timestamps are in range");

    ReceiptBuilder::new(vector.sequence_number, vector.payload.clone())
        .previous(digest(vector.previous_leaf_hash))
        .timestamp(timestamp)
        .sign(&keypair)
}

/// Verify every golden vector against this implementation.
///
/// Returns `(name, matches, detail)` per check.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for v in all_vectors() {
        let receipt = generate_receipt_from_vector(&v);
        let checks = [
            ("payload hash", receipt.payload_hash.to_hex(), v.expected_payload_hash),
            ("leaf hash", receipt.leaf_hash.to_hex(), v.expected_leaf_hash),
            ("signature", receipt.signature.to_hex(), v.expected_signature),
        ];
        for (what, got, expected) in checks {
            results.push((format!("{}: {what}", v.name), got == expected, got));
        }
    }

    for v in digest_vectors() {
        let got = v.computed.to_hex();
        results.push((v.name.to_string(), got == v.expected, got));
    }

    // Key ids do not depend on class; any role yields the same fingerprint.
    for v in key_vectors() {
        let public = Keypair::<role::Chain>::from_seed(&v.seed).public_key();
        let got = format!("{} {}", public.to_hex(), public.key_id().to_hex());
        let matches =
            public.to_hex() == v.expected_public_key && public.key_id().to_hex() == v.expected_key_id;
        results.push((v.name.to_string(), matches, got));
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(CANONICAL_INPUT) {
        let got = canonicalize(&value);
        results.push(("canonical key order".to_string(), got == CANONICAL_OUTPUT, got));
    }

    results
}
