//! Enforcement and disclosure parameters carried inside a policy artifact.

use attestor_core::EnforcementAction;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};

/// When the subject must be re-attested.
///
/// Field-less modes are empty struct variants: serde does not reject unknown
/// fields on unit variants of an internally tagged enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "mode",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum ReattestationPolicy {
    /// Never re-attest; the artifact stands until it expires.
    Never {},
    /// Re-attest after any detected drift.
    OnDrift {},
    /// Re-attest on a fixed interval.
    Interval { interval_ms: u64 },
    /// Re-attest when the artifact expires.
    OnExpiry {},
}

/// How the subject is measured and what happens on drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnforcementParameters {
    /// Interval between measurements.
    pub measurement_cadence_ms: u64,
    /// How long a measurement stays fresh.
    pub ttl_ms: u64,
    /// Action taken on drift.
    pub action: EnforcementAction,
    /// Re-attestation rule.
    pub reattestation: ReattestationPolicy,
}

impl Default for EnforcementParameters {
    fn default() -> Self {
        Self {
            measurement_cadence_ms: 60_000,
            ttl_ms: 86_400_000,
            action: EnforcementAction::Alert,
            reattestation: ReattestationPolicy::OnDrift {},
        }
    }
}

impl EnforcementParameters {
    /// Set the action taken on drift.
    pub fn with_action(mut self, action: EnforcementAction) -> Self {
        self.action = action;
        self
    }

    /// Set the measurement cadence.
    pub fn with_cadence_ms(mut self, cadence_ms: u64) -> Self {
        self.measurement_cadence_ms = cadence_ms;
        self
    }

    /// Reject zero durations.
    pub fn validate(&self) -> Result<()> {
        if self.measurement_cadence_ms == 0 {
            return Err(PolicyError::InvalidParameters(
                "measurementCadenceMs must be positive".into(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(PolicyError::InvalidParameters("ttlMs must be positive".into()));
        }
        if let ReattestationPolicy::Interval { interval_ms: 0 } = self.reattestation {
            return Err(PolicyError::InvalidParameters(
                "reattestation intervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which evidence fields a bundle recipient may see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisclosurePolicy {
    /// Top-level evidence fields disclosed to verifiers.
    pub disclosed_fields: Vec<String>,
    /// Whether exported receipts drop their payloads.
    #[serde(default)]
    pub redact_receipt_payloads: bool,
}

impl DisclosurePolicy {
    /// Disclose only the named fields.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disclosed_fields: fields.into_iter().map(Into::into).collect(),
            redact_receipt_payloads: false,
        }
    }

    /// Also redact receipt payloads on export.
    pub fn redacting_payloads(mut self) -> Self {
        self.redact_receipt_payloads = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_parameters_valid() {
        assert!(EnforcementParameters::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let params = EnforcementParameters::default().with_cadence_ms(0);
        assert!(matches!(params.validate(), Err(PolicyError::InvalidParameters(_))));
    }

    #[test]
    fn test_reattestation_wire_shape() {
        let value = serde_json::to_value(ReattestationPolicy::Interval { interval_ms: 5000 }).unwrap();
        assert_eq!(value, json!({"mode": "INTERVAL", "intervalMs": 5000}));
        let value = serde_json::to_value(ReattestationPolicy::OnDrift {}).unwrap();
        assert_eq!(value, json!({"mode": "ON_DRIFT"}));
    }

    #[test]
    fn test_reattestation_rejects_unknown_fields() {
        let parsed: ReattestationPolicy = serde_json::from_value(json!({"mode": "NEVER"})).unwrap();
        assert_eq!(parsed, ReattestationPolicy::Never {});

        for value in [
            json!({"mode": "NEVER", "approvedBy": "x"}),
            json!({"mode": "INTERVAL", "intervalMs": 5, "jitterMs": 1}),
        ] {
            assert!(serde_json::from_value::<ReattestationPolicy>(value).is_err());
        }
    }

    #[test]
    fn test_parameters_reject_unknown_fields() {
        let mut value = serde_json::to_value(EnforcementParameters::default()).unwrap();
        value["override"] = json!(true);
        assert!(serde_json::from_value::<EnforcementParameters>(value).is_err());
    }

    #[test]
    fn test_parameters_wire_shape() {
        let params = EnforcementParameters::default().with_action(EnforcementAction::Block);
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["action"], "BLOCK");
        assert_eq!(value["measurementCadenceMs"], 60_000);
    }

    #[test]
    fn test_disclosure_builder() {
        let policy = DisclosurePolicy::fields(["model", "rev"]).redacting_payloads();
        assert_eq!(policy.disclosed_fields, vec!["model", "rev"]);
        assert!(policy.redact_receipt_payloads);
    }
}
