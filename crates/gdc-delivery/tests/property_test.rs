//! Property-based tests for payload determinism and signing.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use gdc_core::{CorrelationId, EventType, LeadId, LeadSnapshot};
use gdc_delivery::{
    payload::{canonical_bytes, payload_hash, Payload},
    signing,
};
use hmac::{Hmac, Mac};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use sha2::Sha256;
use uuid::Uuid;

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn lead_strategy() -> impl Strategy<Value = LeadSnapshot> {
    (
        any::<[u8; 16]>(),
        "[A-Za-z0-9 &'.-]{1,40}",
        "[A-Za-z ]{1,20}",
        "[0-9-]{0,15}",
        "\\PC{0,60}",
        prop::option::of(0i64..10_000_000),
    )
        .prop_map(|(id, name, stage, phone, next_action, due)| LeadSnapshot {
            id: LeadId(Uuid::from_bytes(id)),
            business_name: name,
            stage,
            phone,
            next_action,
            next_action_due: due.map(|secs| base_time() + Duration::seconds(secs)),
            value_estimate: 0.0,
            created_at: base_time(),
            first_contact_date: base_time(),
            last_interaction_date: None,
        })
}

fn event_strategy() -> impl Strategy<Value = EventType> {
    prop::sample::select(EventType::ALL.to_vec())
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn same_inputs_give_identical_bytes(
        event_type in event_strategy(),
        lead in lead_strategy(),
        correlation in any::<[u8; 16]>(),
        offset in 0i64..1_000_000,
    ) {
        let correlation_id = CorrelationId(Uuid::from_bytes(correlation));
        let at = base_time() + Duration::seconds(offset);

        let first = Payload::build(event_type, correlation_id, at, Some(&lead), None).unwrap();
        let second =
            Payload::build(event_type, correlation_id, at, Some(&lead.clone()), None).unwrap();

        prop_assert_eq!(first.as_bytes(), second.as_bytes());
        prop_assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn preview_rehash_matches(event_type in event_strategy(), lead in lead_strategy()) {
        let correlation_id = CorrelationId::new();
        let payload =
            Payload::build(event_type, correlation_id, base_time(), Some(&lead), None).unwrap();

        let bytes = canonical_bytes(payload.value()).unwrap();
        prop_assert_eq!(bytes.as_slice(), payload.as_bytes());
        prop_assert_eq!(payload_hash(&bytes), payload.hash());
    }

    #[test]
    fn signature_matches_independent_hmac(
        body in prop::collection::vec(any::<u8>(), 0..512),
        secret in "[!-~]{1,64}",
    ) {
        let signature = signing::sign(&body, &secret).unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(&body);
        let expected = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        prop_assert_eq!(signature, expected);
    }
}
