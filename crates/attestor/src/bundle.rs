//! Evidence bundles: everything a third party needs to verify a run offline.
//!
//! A bundle is produced once by [`BundleAssembler::assemble`] and never
//! edited. It travels either as one canonical JSON document
//! ([`serialize_bundle`] / [`parse_bundle`]) or as a directory of section
//! files indexed by a manifest ([`write_dir`] / [`read_dir`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use attestor_checkpoint::{CheckpointRecord, InclusionProof};
use attestor_core::{
    canonical_json, compute_bytes_hash, hash_canonical, ChainHead, Digest, PublicKeyInfo,
    SignedReceipt, Timestamp,
};
use attestor_policy::PolicyArtifact;
use serde::{Deserialize, Serialize};

use crate::error::BundleError;

/// Current bundle format version.
pub const BUNDLE_VERSION: &str = "1.0";

/// Name of the directory-layout index file.
pub const MANIFEST_FILE: &str = "manifest.json";

const POLICY_ARTIFACT_FILE: &str = "policy-artifact.json";
const CHAIN_HEAD_FILE: &str = "chain-head.json";
const RECEIPTS_FILE: &str = "receipts.json";
const CHECKPOINTS_FILE: &str = "checkpoints.json";
const INCLUSION_PROOFS_FILE: &str = "inclusion-proofs.json";
const PUBLIC_KEYS_FILE: &str = "public-keys.json";
const INSTRUCTIONS_FILE: &str = "verification-instructions.json";

/// The public keys a verifier needs, one per class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundleKeys {
    pub policy_issuer: PublicKeyInfo,
    pub enforcement: PublicKeyInfo,
    pub checkpoint: PublicKeyInfo,
}

/// One file of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: Digest,
    pub size: u64,
}

/// Index of every section file with its hash and size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Look up an entry by path.
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|e| e.path == path)
    }
}

/// Human-readable instructions shipped with every bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationInstructions {
    pub summary: String,
    pub steps: Vec<String>,
}

impl VerificationInstructions {
    fn standard() -> Self {
        Self {
            summary: "Verify offline with the attestor verifier. No network access is needed."
                .to_string(),
            steps: vec![
                "Check the policy artifact signature against publicKeys.policyIssuer and its validity window.".into(),
                "Check every receipt signature against publicKeys.enforcement.".into(),
                "Recompute payload and leaf hashes, previous-hash links, and sequence numbers; compare with chainHead.".into(),
                "Replay each inclusion proof and compare with its checkpoint's merkleRoot.".into(),
                "Check checkpoint signatures against publicKeys.checkpoint, batch contiguity, and anchor proofs.".into(),
            ],
        }
    }
}

/// A portable, self-contained evidence bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvidenceBundle {
    pub bundle_version: String,
    pub created_timestamp: Timestamp,
    pub policy_artifact: PolicyArtifact,
    pub chain_head: ChainHead,
    pub receipts: Vec<SignedReceipt>,
    pub checkpoint_references: Vec<CheckpointRecord>,
    pub inclusion_proofs: Vec<InclusionProof>,
    pub public_keys: BundleKeys,
    pub manifest: Manifest,
    pub verification_instructions: VerificationInstructions,
}

impl EvidenceBundle {
    /// `SHA256(canonical(bundle))`.
    pub fn content_hash(&self) -> Digest {
        hash_canonical(self)
    }

    /// Canonical bytes of every section file, in manifest order.
    pub fn section_files(&self) -> Vec<(&'static str, String)> {
        vec![
            (POLICY_ARTIFACT_FILE, canonical_json(&self.policy_artifact)),
            (CHAIN_HEAD_FILE, canonical_json(&self.chain_head)),
            (RECEIPTS_FILE, canonical_json(&self.receipts)),
            (CHECKPOINTS_FILE, canonical_json(&self.checkpoint_references)),
            (INCLUSION_PROOFS_FILE, canonical_json(&self.inclusion_proofs)),
            (PUBLIC_KEYS_FILE, canonical_json(&self.public_keys)),
            (INSTRUCTIONS_FILE, canonical_json(&self.verification_instructions)),
        ]
    }

    /// Build the manifest the current contents imply.
    pub fn compute_manifest(&self) -> Manifest {
        let files = self
            .section_files()
            .into_iter()
            .map(|(path, content)| ManifestEntry {
                path: path.to_string(),
                sha256: compute_bytes_hash(content.as_bytes()),
                size: content.len() as u64,
            })
            .collect();
        Manifest { files }
    }

    /// Describe every way the stored manifest disagrees with the contents.
    pub fn manifest_mismatches(&self) -> Vec<String> {
        let expected = self.compute_manifest();
        let mut out = Vec::new();
        for entry in &expected.files {
            match self.manifest.entry(&entry.path) {
                None => out.push(format!("{}: missing from manifest", entry.path)),
                Some(stored) if !stored.sha256.ct_eq(&entry.sha256) => {
                    out.push(format!("{}: sha256 {} != {}", entry.path, stored.sha256, entry.sha256))
                }
                Some(stored) if stored.size != entry.size => {
                    out.push(format!("{}: size {} != {}", entry.path, stored.size, entry.size))
                }
                Some(_) => {}
            }
        }
        for stored in &self.manifest.files {
            if expected.entry(&stored.path).is_none() {
                out.push(format!("{}: unknown file", stored.path));
            }
        }
        out
    }

    /// The receipt with the given sequence number, by position.
    pub fn receipt(&self, sequence: u64) -> Option<&SignedReceipt> {
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.receipts
            .get(index)
            .filter(|r| r.sequence_number == sequence)
    }
}

/// Which receipts get inclusion proofs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProofSelection {
    /// No proofs.
    None,
    /// Every receipt covered by a checkpoint.
    #[default]
    All,
    /// Only these sequence numbers; each must be covered.
    Sequences(BTreeSet<u64>),
}

impl ProofSelection {
    /// Prove the given sequence numbers.
    pub fn of<I: IntoIterator<Item = u64>>(sequences: I) -> Self {
        ProofSelection::Sequences(sequences.into_iter().collect())
    }
}

/// Builder for [`EvidenceBundle`]s.
#[derive(Debug, Clone, Default)]
pub struct BundleAssembler {
    artifact: Option<PolicyArtifact>,
    receipts: Vec<SignedReceipt>,
    chain_head: Option<ChainHead>,
    checkpoints: Vec<CheckpointRecord>,
    prove: ProofSelection,
    keys: Option<BundleKeys>,
    redact_payloads: bool,
}

impl BundleAssembler {
    /// Start an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy_artifact(mut self, artifact: PolicyArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// The full chain, in sequence order.
    pub fn receipts(mut self, receipts: Vec<SignedReceipt>) -> Self {
        self.receipts = receipts;
        self
    }

    /// Defaults to the head the receipts imply.
    pub fn chain_head(mut self, head: ChainHead) -> Self {
        self.chain_head = Some(head);
        self
    }

    pub fn checkpoints(mut self, checkpoints: Vec<CheckpointRecord>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn prove(mut self, selection: ProofSelection) -> Self {
        self.prove = selection;
        self
    }

    pub fn keys(mut self, keys: BundleKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Drop receipt payloads on export, keeping their hashes.
    ///
    /// Also implied by the artifact's disclosure policy.
    pub fn redact_payloads(mut self, redact: bool) -> Self {
        self.redact_payloads = redact;
        self
    }

    /// Generate proofs, build the manifest, and produce the bundle.
    pub fn assemble(self, now: Timestamp) -> Result<EvidenceBundle, BundleError> {
        let artifact = self
            .artifact
            .ok_or_else(|| BundleError::Malformed("missing policy artifact".into()))?;
        let keys = self
            .keys
            .ok_or_else(|| BundleError::Malformed("missing public keys".into()))?;
        let chain_head = self
            .chain_head
            .unwrap_or_else(|| ChainHead::from_receipts(&self.receipts));

        let sequences: Vec<u64> = match &self.prove {
            ProofSelection::None => Vec::new(),
            ProofSelection::All => self
                .checkpoints
                .iter()
                .flat_map(|c| c.batch_start..=c.batch_end)
                .collect(),
            ProofSelection::Sequences(set) => set.iter().copied().collect(),
        };

        let mut inclusion_proofs = Vec::with_capacity(sequences.len());
        for seq in sequences {
            let checkpoint = self
                .checkpoints
                .iter()
                .find(|c| c.covers(seq))
                .ok_or(BundleError::MissingProofTarget(seq))?;
            inclusion_proofs.push(checkpoint.inclusion_proof(&self.receipts, seq)?);
        }

        let redact = self.redact_payloads
            || artifact
                .disclosure_policy
                .as_ref()
                .is_some_and(|d| d.redact_receipt_payloads);
        let receipts = if redact {
            self.receipts.iter().map(SignedReceipt::redacted).collect()
        } else {
            self.receipts
        };

        let mut bundle = EvidenceBundle {
            bundle_version: BUNDLE_VERSION.to_string(),
            created_timestamp: now,
            policy_artifact: artifact,
            chain_head,
            receipts,
            checkpoint_references: self.checkpoints,
            inclusion_proofs,
            public_keys: keys,
            manifest: Manifest::default(),
            verification_instructions: VerificationInstructions::standard(),
        };
        bundle.manifest = bundle.compute_manifest();

        tracing::info!(
            artifact_id = %bundle.policy_artifact.artifact_id,
            receipts = bundle.receipts.len(),
            checkpoints = bundle.checkpoint_references.len(),
            proofs = bundle.inclusion_proofs.len(),
            redacted = redact,
            "assembled evidence bundle"
        );
        Ok(bundle)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Single-document form
// ─────────────────────────────────────────────────────────────────────────────

/// Serialize a bundle as canonical JSON.
pub fn serialize_bundle(bundle: &EvidenceBundle) -> String {
    canonical_json(bundle)
}

/// Parse a bundle from JSON text.
pub fn parse_bundle(text: &str) -> Result<EvidenceBundle, BundleError> {
    Ok(serde_json::from_str(text)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory form
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryIndex {
    bundle_version: String,
    created_timestamp: Timestamp,
    manifest: Manifest,
}

/// Write one file per manifest entry plus the manifest itself.
pub fn write_dir(bundle: &EvidenceBundle, dir: &Path) -> Result<(), BundleError> {
    fs::create_dir_all(dir)?;
    for (path, content) in bundle.section_files() {
        fs::write(dir.join(path), content)?;
    }
    let index = DirectoryIndex {
        bundle_version: bundle.bundle_version.clone(),
        created_timestamp: bundle.created_timestamp,
        manifest: bundle.manifest.clone(),
    };
    fs::write(dir.join(MANIFEST_FILE), canonical_json(&index))?;
    tracing::debug!(dir = %dir.display(), "wrote bundle directory");
    Ok(())
}

/// Read a bundle directory, checking every file against the manifest.
pub fn read_dir(dir: &Path) -> Result<EvidenceBundle, BundleError> {
    let index: DirectoryIndex = serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;

    let mut sections = BTreeMap::new();
    for entry in &index.manifest.files {
        if entry.path.contains(['/', '\\']) || entry.path.starts_with('.') {
            return Err(BundleError::ManifestMismatch {
                path: entry.path.clone(),
                reason: "path escapes bundle directory".into(),
            });
        }
        let bytes = fs::read(dir.join(&entry.path))?;
        if bytes.len() as u64 != entry.size {
            return Err(BundleError::ManifestMismatch {
                path: entry.path.clone(),
                reason: format!("size {} != {}", bytes.len(), entry.size),
            });
        }
        let digest = compute_bytes_hash(&bytes);
        if !digest.ct_eq(&entry.sha256) {
            return Err(BundleError::ManifestMismatch {
                path: entry.path.clone(),
                reason: format!("sha256 {digest} != {}", entry.sha256),
            });
        }
        sections.insert(entry.path.as_str(), bytes);
    }

    fn section<T: serde::de::DeserializeOwned>(
        sections: &BTreeMap<&str, Vec<u8>>,
        path: &str,
    ) -> Result<T, BundleError> {
        let bytes = sections
            .get(path)
            .ok_or_else(|| BundleError::Malformed(format!("manifest lacks {path}")))?;
        Ok(serde_json::from_slice(bytes)?)
    }

    Ok(EvidenceBundle {
        bundle_version: index.bundle_version,
        created_timestamp: index.created_timestamp,
        policy_artifact: section(&sections, POLICY_ARTIFACT_FILE)?,
        chain_head: section(&sections, CHAIN_HEAD_FILE)?,
        receipts: section(&sections, RECEIPTS_FILE)?,
        checkpoint_references: section(&sections, CHECKPOINTS_FILE)?,
        inclusion_proofs: section(&sections, INCLUSION_PROOFS_FILE)?,
        public_keys: section(&sections, PUBLIC_KEYS_FILE)?,
        verification_instructions: section(&sections, INSTRUCTIONS_FILE)?,
        manifest: index.manifest,
    })
}
