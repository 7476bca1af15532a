//! Policy artifacts: the sealed, signed baseline for a subject.
//!
//! An artifact is created once by [`ArtifactBuilder::seal`] and never edited.
//! A new policy version is a new artifact whose `supersedes` names the old one.

use attestor_core::{
    canonical_json_without, canonicalize, compute_bytes_hash, generate_salt, hash_canonical,
    hash_concat,
    role::PolicyIssuer,
    Digest, Keypair, PublicKey, Signature, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::enforcement::{DisclosurePolicy, EnforcementParameters};
use crate::error::{PolicyError, Result};
use crate::subject::{SubjectIdentifier, SubjectKind};

/// Current artifact schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Current attestation protocol version.
pub const PROTOCOL_VERSION: &str = "attestor/1";

/// Default issuer identifier.
pub const DEFAULT_ISSUER: &str = "attestor";

/// Prefix of artifact identifiers.
pub const ARTIFACT_ID_PREFIX: &str = "pa_";

/// Where `now` falls relative to an artifact's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// `now < effectiveTimestamp`.
    NotYetEffective,
    /// `effectiveTimestamp <= now < expirationTimestamp`.
    Current,
    /// `now >= expirationTimestamp`.
    Expired,
}

/// A sealed policy artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyArtifact {
    pub schema_version: String,
    pub protocol_version: String,
    pub artifact_id: String,
    pub subject_kind: SubjectKind,
    pub subject_identifier: SubjectIdentifier,
    /// Hash of the governing policy document.
    pub policy_reference: Digest,
    /// Starts at 1; incremented by each superseding artifact.
    pub policy_version: u32,
    /// `SHA256(combinedHash ‖ evidenceCommitment)`.
    pub sealed_hash: Digest,
    /// `SHA256(canonical(disclosedEvidence) ‖ salt)`.
    pub evidence_commitment: Digest,
    pub salt: Digest,
    pub issued_timestamp: Timestamp,
    pub effective_timestamp: Timestamp,
    /// `None` means the artifact never expires.
    pub expiration_timestamp: Option<Timestamp>,
    pub issuer_identifier: String,
    pub enforcement_parameters: EnforcementParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclosure_policy: Option<DisclosurePolicy>,
    /// Artifact id of the version this one replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    /// Policy-issuer signature over every other field.
    pub signature: Signature,
}

/// Commit to disclosed evidence under a salt.
pub fn compute_evidence_commitment(evidence: &Value, salt: &Digest) -> Digest {
    let mut preimage = canonicalize(evidence);
    preimage.push_str(&salt.to_hex());
    compute_bytes_hash(preimage.as_bytes())
}

/// Bind a subject to its evidence commitment.
pub fn compute_sealed_hash(combined_hash: &Digest, evidence_commitment: &Digest) -> Digest {
    hash_concat(&[combined_hash, evidence_commitment])
}

fn derive_artifact_id(
    subject: &SubjectIdentifier,
    policy_version: u32,
    issued: &Timestamp,
    salt: &Digest,
) -> String {
    let digest = hash_canonical(&json!({
        "combinedHash": subject.combined_hash,
        "policyVersion": policy_version,
        "issuedTimestamp": issued,
        "salt": salt,
    }));
    format!("{ARTIFACT_ID_PREFIX}{}", &digest.to_hex()[..16])
}

impl PolicyArtifact {
    /// The exact bytes the issuer signs: canonical JSON without `signature`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        canonical_json_without(self, "signature").into_bytes()
    }

    /// Verify the issuer signature.
    pub fn verify_signature(&self, key: &PublicKey<PolicyIssuer>) -> Result<()> {
        key.verify(&self.signing_bytes(), &self.signature)
            .map_err(|e| PolicyError::SignatureInvalid(e.to_string()))
    }

    /// Classify `now` against the validity window.
    pub fn validity_at(&self, now: &Timestamp) -> Validity {
        if now < &self.effective_timestamp {
            return Validity::NotYetEffective;
        }
        match &self.expiration_timestamp {
            Some(expiration) if now >= expiration => Validity::Expired,
            _ => Validity::Current,
        }
    }

    /// Fail unless the artifact is current at `now`.
    pub fn check_validity(&self, now: &Timestamp) -> Result<()> {
        match self.validity_at(now) {
            Validity::Current => Ok(()),
            Validity::NotYetEffective => Err(PolicyError::NotYetEffective {
                effective: self.effective_timestamp,
                now: *now,
            }),
            Validity::Expired => Err(PolicyError::Expired {
                expiration: self.expiration_timestamp.unwrap_or(*now),
                now: *now,
            }),
        }
    }

    /// Recompute `combinedHash` and `sealedHash` from the stored parts.
    pub fn verify_sealed_hash(&self) -> Result<()> {
        if !self.subject_identifier.verify_combined() {
            return Err(PolicyError::HashMismatch("subjectIdentifier.combinedHash".into()));
        }
        let recomputed =
            compute_sealed_hash(&self.subject_identifier.combined_hash, &self.evidence_commitment);
        if !recomputed.ct_eq(&self.sealed_hash) {
            return Err(PolicyError::HashMismatch(format!(
                "sealedHash: stored {}, recomputed {recomputed}",
                self.sealed_hash
            )));
        }
        Ok(())
    }

    /// Check evidence revealed later against the sealed commitment.
    pub fn verify_evidence_commitment(&self, evidence: &Value) -> bool {
        compute_evidence_commitment(evidence, &self.salt).ct_eq(&self.evidence_commitment)
    }

    /// Start a builder for the next policy version of the same subject.
    pub fn supersede(&self) -> ArtifactBuilder {
        let mut builder = ArtifactBuilder::new(self.subject_kind, self.subject_identifier.clone())
            .policy_reference(self.policy_reference)
            .policy_version(self.policy_version.saturating_add(1))
            .enforcement(self.enforcement_parameters.clone())
            .issuer(self.issuer_identifier.clone());
        if let Some(disclosure) = &self.disclosure_policy {
            builder = builder.disclosure(disclosure.clone());
        }
        builder.supersedes = Some(self.artifact_id.clone());
        builder
    }
}

/// Builder for sealing policy artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    subject_kind: SubjectKind,
    subject_identifier: SubjectIdentifier,
    policy_reference: Digest,
    policy_version: u32,
    enforcement: EnforcementParameters,
    disclosure: Option<DisclosurePolicy>,
    disclosed_evidence: Value,
    effective: Option<Timestamp>,
    expiration: Option<Timestamp>,
    issuer_identifier: String,
    schema_version: String,
    protocol_version: String,
    supersedes: Option<String>,
}

impl ArtifactBuilder {
    /// Start building an artifact for a subject.
    pub fn new(subject_kind: SubjectKind, subject_identifier: SubjectIdentifier) -> Self {
        Self {
            subject_kind,
            subject_identifier,
            policy_reference: Digest::GENESIS,
            policy_version: 1,
            enforcement: EnforcementParameters::default(),
            disclosure: None,
            disclosed_evidence: Value::Object(Map::new()),
            effective: None,
            expiration: None,
            issuer_identifier: DEFAULT_ISSUER.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            supersedes: None,
        }
    }

    /// Set the hash of the governing policy document.
    pub fn policy_reference(mut self, reference: Digest) -> Self {
        self.policy_reference = reference;
        self
    }

    /// Set the policy version.
    pub fn policy_version(mut self, version: u32) -> Self {
        self.policy_version = version;
        self
    }

    /// Set the enforcement parameters.
    pub fn enforcement(mut self, params: EnforcementParameters) -> Self {
        self.enforcement = params;
        self
    }

    /// Set the disclosure policy.
    pub fn disclosure(mut self, policy: DisclosurePolicy) -> Self {
        self.disclosure = Some(policy);
        self
    }

    /// Set the evidence committed to (not stored in the artifact).
    pub fn disclosed_evidence(mut self, evidence: Value) -> Self {
        self.disclosed_evidence = evidence;
        self
    }

    /// Set the effective timestamp (defaults to the sealing time).
    pub fn effective(mut self, ts: Timestamp) -> Self {
        self.effective = Some(ts);
        self
    }

    /// Set the expiration timestamp.
    pub fn expires(mut self, ts: Timestamp) -> Self {
        self.expiration = Some(ts);
        self
    }

    /// Set the issuer identifier.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer_identifier = issuer.into();
        self
    }

    /// Override schema and protocol versions.
    pub fn versions(mut self, schema: impl Into<String>, protocol: impl Into<String>) -> Self {
        self.schema_version = schema.into();
        self.protocol_version = protocol.into();
        self
    }

    /// Commit, hash, sign, and produce the artifact.
    pub fn seal(self, keypair: &Keypair<PolicyIssuer>, now: Timestamp) -> Result<PolicyArtifact> {
        if self.policy_version == 0 {
            return Err(PolicyError::InvalidVersion(0));
        }
        let effective = self.effective.unwrap_or(now);
        if let Some(expiration) = self.expiration {
            if expiration <= effective {
                return Err(PolicyError::InvalidWindow {
                    effective,
                    expiration,
                });
            }
        }
        self.enforcement.validate()?;

        let salt = generate_salt();
        let evidence_commitment = compute_evidence_commitment(&self.disclosed_evidence, &salt);
        let sealed_hash =
            compute_sealed_hash(&self.subject_identifier.combined_hash, &evidence_commitment);
        let artifact_id =
            derive_artifact_id(&self.subject_identifier, self.policy_version, &now, &salt);

        let mut artifact = PolicyArtifact {
            schema_version: self.schema_version,
            protocol_version: self.protocol_version,
            artifact_id,
            subject_kind: self.subject_kind,
            subject_identifier: self.subject_identifier,
            policy_reference: self.policy_reference,
            policy_version: self.policy_version,
            sealed_hash,
            evidence_commitment,
            salt,
            issued_timestamp: now,
            effective_timestamp: effective,
            expiration_timestamp: self.expiration,
            issuer_identifier: self.issuer_identifier,
            enforcement_parameters: self.enforcement,
            disclosure_policy: self.disclosure,
            supersedes: self.supersedes,
            signature: Signature::ZERO,
        };
        artifact.signature = keypair.sign(&artifact.signing_bytes());

        tracing::info!(
            artifact_id = %artifact.artifact_id,
            policy_version = artifact.policy_version,
            "sealed policy artifact"
        );
        Ok(artifact)
    }
}
