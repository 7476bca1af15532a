//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use attestor_core::{
    ChainEvent, Digest, DriftSeverity, EnforcementAction, EventPayload, KeyRole, Keypair,
    ReceiptChain, RunOutcome, Timestamp,
};

/// Generate a random keypair of any class.
pub fn keypair<R: KeyRole>() -> impl Strategy<Value = Keypair<R>> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random digest.
pub fn digest() -> impl Strategy<Value = Digest> {
    any::<[u8; 32]>().prop_map(Digest::from_bytes)
}

/// Generate a timestamp between 1970 and 2100 at millisecond precision.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0i64..=4_102_444_800_000i64).prop_filter_map("out of range", Timestamp::from_millis)
}

/// Generate an arbitrary JSON value of bounded depth.
///
/// Numbers are integers; floats have their own canonicalization tests.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        "\\PC{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z0-9_]{0,8}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn drift_severity() -> impl Strategy<Value = DriftSeverity> {
    prop_oneof![
        Just(DriftSeverity::Low),
        Just(DriftSeverity::Medium),
        Just(DriftSeverity::High),
        Just(DriftSeverity::Critical),
    ]
}

fn enforcement_action() -> impl Strategy<Value = EnforcementAction> {
    prop_oneof![
        Just(EnforcementAction::Alert),
        Just(EnforcementAction::Quarantine),
        Just(EnforcementAction::Block),
        Just(EnforcementAction::Terminate),
    ]
}

/// Generate a mid-run payload: measurements, drift, and enforcement.
pub fn event_payload() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        (0u64..1000, digest()).prop_map(|(measurement_index, hash)| {
            EventPayload::MeasurementOk {
                measurement_index,
                measured_hash: hash,
                expected_hash: hash,
            }
        }),
        (0u64..1000, digest(), digest(), drift_severity()).prop_map(
            |(measurement_index, measured_hash, expected_hash, severity)| {
                EventPayload::DriftDetected {
                    measurement_index,
                    measured_hash,
                    expected_hash,
                    severity,
                }
            }
        ),
        (enforcement_action(), "[a-z ]{0,32}", any::<Option<u64>>()).prop_map(
            |(action, reason, drift_sequence)| EventPayload::Enforced {
                action,
                reason,
                drift_sequence,
            }
        ),
    ]
}

/// Terminal payload for a run of `receipt_count` receipts.
pub fn run_ended(receipt_count: u64) -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        Just(RunOutcome::Completed),
        Just(RunOutcome::Terminated),
        Just(RunOutcome::Aborted),
    ]
    .prop_map(move |outcome| EventPayload::RunEnded {
        receipt_count,
        outcome,
    })
}

/// Parameters for generating a receipt chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Enforcement key seed.
    pub seed: [u8; 32],
    /// Time of the first event.
    pub start: Timestamp,
    /// Payloads in append order, each with its delay after the previous one.
    pub events: Vec<(u32, EventPayload)>,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            timestamp(),
            prop::collection::vec((0u32..60_000, event_payload()), 1..=24),
        )
            .prop_map(|(seed, start, events)| ChainParams {
                seed,
                start,
                events,
            })
            .boxed()
    }
}

/// Build the chain a [`ChainParams`] describes.
pub fn chain_from_params(params: &ChainParams) -> ReceiptChain {
    let keypair = Keypair::from_seed(&params.seed);
    let mut chain = ReceiptChain::new();
    let mut now = params.start;
    for (delay, payload) in &params.events {
        now = now.plus_millis(i64::from(*delay)).unwrap_or(now);
        chain.append_event(ChainEvent::at(now, payload.clone()), &keypair);
    }
    chain
}
