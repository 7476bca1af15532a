//! # Attestor
//!
//! Tamper-evident attestation with offline verification.
//!
//! ## Overview
//!
//! An issuer seals a **policy artifact** describing the integrity baseline of
//! a subject, appends signed, hash-linked **receipts** as it measures and
//! enforces, batches them into Merkle **checkpoints**, and exports an
//! **evidence bundle**. Anyone holding the bundle can verify it offline and
//! get a deterministic verdict.
//!
//! ## Key Concepts
//!
//! - **Policy artifact**: Sealed once, never edited. New versions supersede.
//! - **Receipt chain**: One writer per run. Sequence numbers are contiguous.
//! - **Checkpoint**: A signed Merkle root over a contiguous receipt range.
//! - **Verdict**: `PASS`, `PASS_WITH_CAVEATS`, `FAIL`, or `NOT_FOUND`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attestor::{Issuer, IssuerConfig, IssuerKeys, OfflineVerifier, ProofSelection};
//! use attestor::core::{RunOutcome, Timestamp};
//! use attestor::policy::{ArtifactBuilder, Subject, SubjectKind};
//! use serde_json::json;
//!
//! async fn example() {
//!     let issuer = Issuer::new(IssuerKeys::generate(), IssuerConfig::default());
//!     let subject = Subject::new(SubjectKind::Config, b"threshold = 3".to_vec(), json!({}));
//!
//!     let now = Timestamp::now();
//!     let artifact = issuer
//!         .seal(ArtifactBuilder::new(subject.kind, subject.identifier()), now)
//!         .unwrap();
//!
//!     let run = issuer.start_run(artifact, now).await.unwrap();
//!     run.finalize(RunOutcome::Completed, now).await.unwrap();
//!
//!     let bundle = run.export_bundle(ProofSelection::All, now).await.unwrap();
//!     let report = OfflineVerifier::default().verify(&bundle, now);
//!     assert!(report.verdict.is_pass());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `attestor::core` - Canonical JSON, keys, receipts, chains
//! - `attestor::policy` - Policy artifacts
//! - `attestor::checkpoint` - Merkle checkpoints and anchoring

pub mod bundle;
pub mod error;
pub mod session;
pub mod verifier;

// Re-export component crates
pub use attestor_checkpoint as checkpoint;
pub use attestor_core as core;
pub use attestor_policy as policy;

// Re-export main types for convenience
pub use bundle::{
    parse_bundle, read_dir, serialize_bundle, write_dir, BundleAssembler, BundleKeys,
    EvidenceBundle, Manifest, ManifestEntry, ProofSelection, VerificationInstructions,
    BUNDLE_VERSION,
};
pub use error::{AttestorError, BundleError, Result};
pub use session::{Issuer, IssuerConfig, IssuerKeys, RunSession};
pub use verifier::{
    Finding, OfflineVerifier, StepName, StepResult, StepStatus, VerificationReport, Verdict,
    VerifierConfig,
};

// Re-export commonly used core types
pub use attestor_core::{
    ChainEvent, ChainHead, Digest, EventPayload, EventType, FailureKind, Keypair, PublicKey,
    SignedReceipt, SourceEvent, Timestamp,
};
