//! # Attestor Policy
//!
//! Policy artifacts: the signed integrity and enforcement baseline of a
//! subject.
//!
//! ## Overview
//!
//! An issuer hashes a [`Subject`] into a [`SubjectIdentifier`], commits to
//! the evidence it may later disclose under a fresh salt, and seals the
//! result into a [`PolicyArtifact`] signed with its policy-issuer key.
//! Artifacts are never edited; a new version supersedes the old one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attestor_core::{role::PolicyIssuer, Keypair, Timestamp};
//! use attestor_policy::{ArtifactBuilder, Subject, SubjectKind};
//! use serde_json::json;
//!
//! let issuer = Keypair::<PolicyIssuer>::generate();
//! let subject = Subject::new(SubjectKind::File, b"contents".to_vec(), json!({"path": "/bin/app"}));
//!
//! let artifact = ArtifactBuilder::new(subject.kind, subject.identifier())
//!     .seal(&issuer, Timestamp::now())
//!     .unwrap();
//! assert!(artifact.verify_signature(&issuer.public_key()).is_ok());
//! ```

pub mod artifact;
pub mod enforcement;
pub mod error;
pub mod subject;

pub use artifact::{
    compute_evidence_commitment, compute_sealed_hash, ArtifactBuilder, PolicyArtifact, Validity,
    ARTIFACT_ID_PREFIX, DEFAULT_ISSUER, PROTOCOL_VERSION, SCHEMA_VERSION,
};
pub use enforcement::{DisclosurePolicy, EnforcementParameters, ReattestationPolicy};
pub use error::{PolicyError, Result};
pub use subject::{Subject, SubjectIdentifier, SubjectKind};
