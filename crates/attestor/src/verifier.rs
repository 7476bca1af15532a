//! Offline verification of evidence bundles.
//!
//! The verifier is a pure function of the bundle and a caller-supplied
//! `now`. It never touches the network. Five steps run in a fixed order and
//! every step always runs to completion, so a report lists every problem in
//! the bundle rather than the first one.
//!
//! ## Verdict
//!
//! - Any INVALID step: `FAIL`.
//! - Otherwise any caveat: `PASS_WITH_CAVEATS`.
//! - Otherwise: `PASS`.
//!
//! `NOT_FOUND` is reserved for input in which no policy artifact can be
//! located at all.

use std::sync::Arc;

use attestor_checkpoint::{check_contiguity, verify_inclusion_proof_against};
use attestor_core::{
    role::{Checkpoint, Enforcement, PolicyIssuer},
    verify_chain_integrity, verify_receipt_signatures, ChainError, Digest, EventPayload,
    FailureKind, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::EvidenceBundle;

/// Configuration for the [`OfflineVerifier`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Accept simulated anchors as a caveat. When false they fail step 5.
    pub allow_simulated_anchor: bool,
    /// Bundles with more receipts than this are rejected unverified.
    pub max_receipts: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            allow_simulated_anchor: true,
            max_receipts: 1_000_000,
        }
    }
}

/// The five verification steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepName {
    PolicySignature,
    ReceiptSignatures,
    ChainIntegrity,
    MerkleProofs,
    CheckpointAnchor,
}

impl StepName {
    /// Every step in order.
    pub const ALL: [StepName; 5] = [
        StepName::PolicySignature,
        StepName::ReceiptSignatures,
        StepName::ChainIntegrity,
        StepName::MerkleProofs,
        StepName::CheckpointAnchor,
    ];

    /// Wire name of the step.
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::PolicySignature => "POLICY_SIGNATURE",
            StepName::ReceiptSignatures => "RECEIPT_SIGNATURES",
            StepName::ChainIntegrity => "CHAIN_INTEGRITY",
            StepName::MerkleProofs => "MERKLE_PROOFS",
            StepName::CheckpointAnchor => "CHECKPOINT_ANCHOR",
        }
    }
}

/// Status of one step. `Pending` means the step never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Valid,
    Invalid,
    Skipped,
}

/// One failure or caveat found by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FailureKind,
    /// Sequence number of the offending receipt, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub detail: String,
}

impl Finding {
    /// A finding not tied to one receipt.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            sequence: None,
            detail: detail.into(),
        }
    }

    /// A finding about the receipt at `sequence`.
    pub fn at(kind: FailureKind, sequence: u64, detail: impl Into<String>) -> Self {
        Self {
            kind,
            sequence: Some(sequence),
            detail: detail.into(),
        }
    }
}

impl From<ChainError> for Finding {
    fn from(err: ChainError) -> Self {
        Finding::at(
            err.kind,
            err.sequence,
            format!("receipt {}: {}", err.index, err.reason),
        )
    }
}

/// The outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: StepName,
    pub status: StepStatus,
    pub details: String,
    pub failures: Vec<Finding>,
    pub caveats: Vec<Finding>,
}

impl StepResult {
    fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            details: String::new(),
            failures: Vec::new(),
            caveats: Vec::new(),
        }
    }

    fn skipped(name: StepName, details: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            details: details.into(),
            ..Self::pending(name)
        }
    }

    fn fail(&mut self, finding: Finding) {
        self.failures.push(finding);
    }

    fn caveat(&mut self, finding: Finding) {
        self.caveats.push(finding);
    }

    fn finish(mut self, details: impl Into<String>) -> Self {
        self.status = if self.failures.is_empty() {
            StepStatus::Valid
        } else {
            StepStatus::Invalid
        };
        self.details = details.into();
        self
    }

    /// Check if the step found at least one failure.
    pub fn is_invalid(&self) -> bool {
        self.status == StepStatus::Invalid
    }
}

/// The overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    PassWithCaveats,
    Fail,
    NotFound,
}

impl Verdict {
    /// Fold step results into a verdict.
    pub fn from_steps(steps: &[StepResult]) -> Self {
        if steps.iter().any(StepResult::is_invalid) {
            Verdict::Fail
        } else if steps.iter().any(|s| !s.caveats.is_empty()) {
            Verdict::PassWithCaveats
        } else {
            Verdict::Pass
        }
    }

    /// Check if the verdict is `PASS` or `PASS_WITH_CAVEATS`.
    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass | Verdict::PassWithCaveats)
    }

    /// Ordering from best to worst; `NOT_FOUND` ranks with `FAIL`.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::PassWithCaveats => 1,
            Verdict::Fail | Verdict::NotFound => 2,
        }
    }
}

/// The full result of verifying one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verdict: Verdict,
    pub verified_at: Timestamp,
    /// Content hash of the verified bundle, when one was parsed.
    pub bundle_hash: Option<Digest>,
    pub artifact_id: Option<String>,
    /// Always all five steps, in order.
    pub steps: Vec<StepResult>,
    /// Failures found before any step ran.
    pub failures: Vec<Finding>,
}

impl VerificationReport {
    fn unverified(
        verdict: Verdict,
        now: Timestamp,
        artifact_id: Option<String>,
        finding: Finding,
    ) -> Self {
        Self {
            verdict,
            verified_at: now,
            bundle_hash: None,
            artifact_id,
            steps: StepName::ALL.into_iter().map(StepResult::pending).collect(),
            failures: vec![finding],
        }
    }

    /// The result of one step.
    pub fn step(&self, name: StepName) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Every failure, from the precheck and from all steps.
    pub fn all_failures(&self) -> impl Iterator<Item = &Finding> {
        self.failures
            .iter()
            .chain(self.steps.iter().flat_map(|s| s.failures.iter()))
    }

    /// Every caveat from all steps.
    pub fn caveats(&self) -> impl Iterator<Item = &Finding> {
        self.steps.iter().flat_map(|s| s.caveats.iter())
    }
}

/// Verifies evidence bundles without network access.
#[derive(Debug, Clone, Default)]
pub struct OfflineVerifier {
    config: VerifierConfig,
}

impl OfflineVerifier {
    /// Create a verifier with the given configuration.
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify a parsed bundle at `now`.
    pub fn verify(&self, bundle: &EvidenceBundle, now: Timestamp) -> VerificationReport {
        if let Some(report) = self.precheck(bundle, now) {
            return report;
        }
        let steps = vec![
            check_policy(bundle, &now),
            check_receipt_signatures(bundle),
            check_chain(bundle),
            check_merkle_proofs(bundle),
            check_checkpoints(bundle, &self.config),
        ];
        conclude(bundle, steps, now)
    }

    /// Parse and verify raw bundle bytes.
    ///
    /// Input without a `policyArtifact` carrying a string `artifactId` yields
    /// `NOT_FOUND`. Anything else that fails to parse, including unknown
    /// fields in signed or hashed sections, yields `FAIL` with
    /// `MALFORMED_BUNDLE` and no step run.
    pub fn verify_bytes(&self, bytes: &[u8], now: Timestamp) -> VerificationReport {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => return not_found(now, format!("input is not JSON: {e}")),
        };
        // Located by id alone; the strict parse below decides FAIL.
        let artifact_id = match value.get("policyArtifact") {
            None => return not_found(now, "no policyArtifact"),
            Some(artifact) => match artifact.get("artifactId").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => return not_found(now, "policyArtifact has no artifactId"),
            },
        };

        match serde_json::from_value::<EvidenceBundle>(value) {
            Ok(bundle) => self.verify(&bundle, now),
            Err(e) => {
                tracing::warn!(artifact_id = %artifact_id, error = %e, "malformed bundle");
                VerificationReport::unverified(
                    Verdict::Fail,
                    now,
                    Some(artifact_id),
                    Finding::new(FailureKind::MalformedBundle, e.to_string()),
                )
            }
        }
    }

    /// Verify with each step on the blocking pool.
    ///
    /// The report is identical to [`verify`](Self::verify).
    pub async fn verify_parallel(
        &self,
        bundle: Arc<EvidenceBundle>,
        now: Timestamp,
    ) -> VerificationReport {
        if let Some(report) = self.precheck(&bundle, now) {
            return report;
        }

        let (b1, b2, b3, b4, b5) = (
            Arc::clone(&bundle),
            Arc::clone(&bundle),
            Arc::clone(&bundle),
            Arc::clone(&bundle),
            Arc::clone(&bundle),
        );
        let config = self.config.clone();
        let (s1, s2, s3, s4, s5) = tokio::join!(
            tokio::task::spawn_blocking(move || check_policy(&b1, &now)),
            tokio::task::spawn_blocking(move || check_receipt_signatures(&b2)),
            tokio::task::spawn_blocking(move || check_chain(&b3)),
            tokio::task::spawn_blocking(move || check_merkle_proofs(&b4)),
            tokio::task::spawn_blocking(move || check_checkpoints(&b5, &config)),
        );

        let steps = StepName::ALL
            .into_iter()
            .zip([s1, s2, s3, s4, s5])
            .map(|(name, joined)| {
                joined.unwrap_or_else(|e| {
                    let mut step = StepResult::pending(name);
                    step.fail(Finding::new(
                        FailureKind::MalformedBundle,
                        format!("step did not complete: {e}"),
                    ));
                    step.finish("aborted")
                })
            })
            .collect();
        conclude(&bundle, steps, now)
    }

    fn precheck(&self, bundle: &EvidenceBundle, now: Timestamp) -> Option<VerificationReport> {
        if bundle.receipts.len() > self.config.max_receipts {
            tracing::warn!(
                receipts = bundle.receipts.len(),
                max = self.config.max_receipts,
                "bundle exceeds receipt limit"
            );
            return Some(VerificationReport::unverified(
                Verdict::Fail,
                now,
                Some(bundle.policy_artifact.artifact_id.clone()),
                Finding::new(
                    FailureKind::MalformedBundle,
                    format!(
                        "{} receipts exceeds limit of {}",
                        bundle.receipts.len(),
                        self.config.max_receipts
                    ),
                ),
            ));
        }
        None
    }
}

fn not_found(now: Timestamp, detail: impl Into<String>) -> VerificationReport {
    let detail = detail.into();
    tracing::info!(reason = %detail, "no policy artifact found");
    VerificationReport::unverified(
        Verdict::NotFound,
        now,
        None,
        Finding::new(FailureKind::MalformedBundle, detail),
    )
}

fn conclude(bundle: &EvidenceBundle, steps: Vec<StepResult>, now: Timestamp) -> VerificationReport {
    for step in steps.iter().filter(|s| s.is_invalid()) {
        tracing::warn!(
            step = step.name.as_str(),
            failures = step.failures.len(),
            first = %step.failures.first().map_or("", |f| f.detail.as_str()),
            "verification step invalid"
        );
    }
    let verdict = Verdict::from_steps(&steps);
    tracing::info!(
        artifact_id = %bundle.policy_artifact.artifact_id,
        verdict = ?verdict,
        "verified bundle"
    );
    VerificationReport {
        verdict,
        verified_at: now,
        bundle_hash: Some(bundle.content_hash()),
        artifact_id: Some(bundle.policy_artifact.artifact_id.clone()),
        steps,
        failures: Vec::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

/// Step 1: issuer signature, sealed hash, and validity window.
fn check_policy(bundle: &EvidenceBundle, now: &Timestamp) -> StepResult {
    let mut step = StepResult::pending(StepName::PolicySignature);
    let artifact = &bundle.policy_artifact;

    match bundle.public_keys.policy_issuer.to_public_key::<PolicyIssuer>() {
        Ok(key) => {
            if let Err(e) = artifact.verify_signature(&key) {
                step.fail(Finding::new(e.failure_kind(), e.to_string()));
            }
        }
        Err(e) => step.fail(Finding::new(
            FailureKind::SignatureInvalid,
            format!("policy issuer key: {e}"),
        )),
    }
    if let Err(e) = artifact.verify_sealed_hash() {
        step.fail(Finding::new(e.failure_kind(), e.to_string()));
    }
    if let Err(e) = artifact.check_validity(now) {
        step.fail(Finding::new(e.failure_kind(), e.to_string()));
    }

    step.finish(format!(
        "artifact {} version {}",
        artifact.artifact_id, artifact.policy_version
    ))
}

/// Step 2: every receipt signed by the enforcement key.
fn check_receipt_signatures(bundle: &EvidenceBundle) -> StepResult {
    let mut step = StepResult::pending(StepName::ReceiptSignatures);
    let key = match bundle.public_keys.enforcement.to_public_key::<Enforcement>() {
        Ok(key) => key,
        Err(e) => {
            step.fail(Finding::new(
                FailureKind::SignatureInvalid,
                format!("enforcement key: {e}"),
            ));
            return step.finish(format!("0/{} receipt signatures valid", bundle.receipts.len()));
        }
    };

    let report = verify_receipt_signatures(&bundle.receipts, &key);
    step.failures
        .extend(report.failures.into_iter().map(Finding::from));
    step.finish(format!(
        "{}/{} receipt signatures valid",
        report.valid_count, report.total
    ))
}

/// Step 3: hashes, linkage, sequence, head, and the policy binding.
fn check_chain(bundle: &EvidenceBundle) -> StepResult {
    let mut step = StepResult::pending(StepName::ChainIntegrity);
    let keys = match bundle.public_keys.enforcement.to_public_key::<Enforcement>() {
        Ok(key) => vec![key],
        Err(e) => {
            step.fail(Finding::new(
                FailureKind::SignatureInvalid,
                format!("enforcement key: {e}"),
            ));
            Vec::new()
        }
    };

    let report = verify_chain_integrity(&bundle.receipts, Some(&bundle.chain_head), &keys);
    let error_count = report.errors.len();
    step.failures
        .extend(report.errors.into_iter().map(Finding::from));

    let artifact = &bundle.policy_artifact;
    for receipt in &bundle.receipts {
        if let Some(EventPayload::PolicyLoaded {
            artifact_id,
            sealed_hash,
            ..
        }) = &receipt.payload
        {
            if artifact_id != &artifact.artifact_id || !sealed_hash.ct_eq(&artifact.sealed_hash) {
                step.fail(Finding::at(
                    FailureKind::ChainBroken,
                    receipt.sequence_number,
                    format!(
                        "POLICY_LOADED names artifact {artifact_id}, bundle carries {}",
                        artifact.artifact_id
                    ),
                ));
            }
        }
    }

    step.finish(format!(
        "{} receipts, {error_count} chain errors",
        report.receipt_count
    ))
}

/// Step 4: every inclusion proof reaches its checkpoint's root.
fn check_merkle_proofs(bundle: &EvidenceBundle) -> StepResult {
    if bundle.inclusion_proofs.is_empty() {
        return StepResult::skipped(StepName::MerkleProofs, "no inclusion proofs");
    }
    let mut step = StepResult::pending(StepName::MerkleProofs);

    for proof in &bundle.inclusion_proofs {
        let seq = proof.event_sequence;
        let Some(checkpoint) = bundle
            .checkpoint_references
            .iter()
            .find(|c| c.checkpoint_id == proof.checkpoint_reference)
        else {
            step.fail(Finding::at(
                FailureKind::MalformedBundle,
                seq,
                format!("unknown checkpoint {:?}", proof.checkpoint_reference),
            ));
            continue;
        };

        if !checkpoint.covers(seq) {
            step.fail(Finding::at(
                FailureKind::ChainBroken,
                seq,
                format!("outside checkpoint {}", checkpoint.checkpoint_id),
            ));
        }
        if !verify_inclusion_proof_against(proof, &checkpoint.merkle_root) {
            step.fail(Finding::at(
                FailureKind::HashMismatch,
                seq,
                format!("proof does not reach root of {}", checkpoint.checkpoint_id),
            ));
        }
        match bundle.receipt(seq) {
            Some(receipt) if receipt.leaf_hash.ct_eq(&proof.event_leaf_hash) => {}
            Some(_) => step.fail(Finding::at(
                FailureKind::HashMismatch,
                seq,
                "eventLeafHash differs from the receipt's leafHash",
            )),
            None => step.fail(Finding::at(
                FailureKind::MalformedBundle,
                seq,
                "no receipt with this sequence number",
            )),
        }
    }

    let total = bundle.inclusion_proofs.len();
    let bad = step
        .failures
        .iter()
        .filter_map(|f| f.sequence)
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    step.finish(format!("{}/{total} inclusion proofs verified", total - bad.min(total)))
}

/// Step 5: checkpoint signatures, coverage, contiguity, and anchors.
fn check_checkpoints(bundle: &EvidenceBundle, config: &VerifierConfig) -> StepResult {
    if bundle.checkpoint_references.is_empty() {
        let mut step = StepResult::skipped(StepName::CheckpointAnchor, "no checkpoints");
        step.caveat(Finding::new(
            FailureKind::AnchorUnverifiable,
            "no checkpoint anchors the chain",
        ));
        return step;
    }
    let mut step = StepResult::pending(StepName::CheckpointAnchor);

    let key = match bundle.public_keys.checkpoint.to_public_key::<Checkpoint>() {
        Ok(key) => Some(key),
        Err(e) => {
            step.fail(Finding::new(
                FailureKind::SignatureInvalid,
                format!("checkpoint key: {e}"),
            ));
            None
        }
    };

    for checkpoint in &bundle.checkpoint_references {
        let id = &checkpoint.checkpoint_id;
        if let Some(key) = &key {
            if let Err(e) = checkpoint.verify_signature(key) {
                step.fail(Finding::new(
                    FailureKind::SignatureInvalid,
                    format!("checkpoint {id}: {e}"),
                ));
            }
        }

        if checkpoint.batch_of(&bundle.receipts).is_none() {
            step.fail(Finding::new(
                FailureKind::ChainBroken,
                format!(
                    "checkpoint {id} covers {}..={} beyond {} receipts",
                    checkpoint.batch_start,
                    checkpoint.batch_end,
                    bundle.receipts.len()
                ),
            ));
        } else if !checkpoint.matches_receipts(&bundle.receipts) {
            step.fail(Finding::new(
                FailureKind::HashMismatch,
                format!("checkpoint {id}: merkleRoot does not match receipts"),
            ));
        }

        let anchor = &checkpoint.anchor_proof;
        if let Err(e) = anchor.validate_structure() {
            step.fail(Finding::new(
                FailureKind::MalformedBundle,
                format!("checkpoint {id}: {e}"),
            ));
        } else if anchor.is_simulated() {
            let finding = Finding::new(
                FailureKind::AnchorUnverifiable,
                format!("checkpoint {id}: simulated anchor {}", anchor.transaction_ref()),
            );
            if config.allow_simulated_anchor {
                step.caveat(finding);
            } else {
                step.fail(finding);
            }
        }
    }

    for err in check_contiguity(&bundle.checkpoint_references) {
        step.fail(Finding::new(FailureKind::ChainBroken, err.to_string()));
    }

    let covered = bundle
        .checkpoint_references
        .last()
        .map_or(0, |c| c.batch_end);
    step.finish(format!(
        "{} checkpoints covering sequences 1..={covered}",
        bundle.checkpoint_references.len()
    ))
}
