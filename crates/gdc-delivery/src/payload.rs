//! Canonical webhook payloads.
//!
//! A payload is built once per run and never re-serialized: the bytes that
//! are hashed, signed and posted are the same bytes. Canonical form is
//! compact JSON with object keys sorted at every depth, so rebuilding a
//! payload from the same logical inputs, or re-encoding a retained
//! `payload_preview`, reproduces the stored `payload_hash`.

use chrono::{DateTime, Utc};
use gdc_core::{CorrelationId, EventType, LeadId, LeadSnapshot, SummarySnapshot};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{DeliveryError, Result};

/// Normalized lead projection embedded under `lead`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadProjection {
    /// Lead identifier.
    pub lead_id: String,
    /// Business name.
    pub business_name: String,
    /// Pipeline stage name.
    pub stage: String,
    /// Contact phone.
    pub phone: String,
    /// Next-action description.
    pub next_action: String,
    /// Next-action due time as Unix seconds.
    pub next_action_due: Option<i64>,
}

impl From<&LeadSnapshot> for LeadProjection {
    fn from(lead: &LeadSnapshot) -> Self {
        Self {
            lead_id: lead.id.to_string(),
            business_name: lead.business_name.clone(),
            stage: lead.stage.clone(),
            phone: lead.phone.clone(),
            next_action: lead.next_action.clone(),
            next_action_due: lead.next_action_due.map(|due| due.timestamp()),
        }
    }
}

/// A built payload together with its canonical bytes and hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    event_type: EventType,
    correlation_id: CorrelationId,
    subject_id: Option<LeadId>,
    timestamp: i64,
    value: Value,
    bytes: Vec<u8>,
    hash: String,
}

impl Payload {
    /// Builds a payload for a known event type.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InternalError` if the snapshots cannot be
    /// encoded as JSON.
    pub fn build(
        event_type: EventType,
        correlation_id: CorrelationId,
        timestamp: DateTime<Utc>,
        lead: Option<&LeadSnapshot>,
        summary: Option<&SummarySnapshot>,
    ) -> Result<Self> {
        let mut root = Map::new();
        root.insert("event_type".to_string(), Value::from(event_type.as_str()));
        root.insert("timestamp".to_string(), Value::from(timestamp.timestamp()));
        root.insert("correlation_id".to_string(), Value::from(correlation_id.to_string()));

        if let Some(lead) = lead {
            root.insert("lead".to_string(), to_value(&LeadProjection::from(lead))?);
            root.insert("lead_id".to_string(), Value::from(lead.id.to_string()));
        }

        if let Some(summary) = summary {
            root.insert("summary".to_string(), to_value(summary)?);
        }

        let value = canonicalize(Value::Object(root));
        let bytes = canonical_bytes(&value)?;
        let hash = payload_hash(&bytes);

        Ok(Self {
            event_type,
            correlation_id,
            subject_id: lead.map(|lead| lead.id),
            timestamp: timestamp.timestamp(),
            value,
            bytes,
            hash,
        })
    }

    /// Builds a payload from an event type name.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidEventType` if `event_type` is not one of
    /// the supported names. Nothing else is evaluated in that case.
    pub fn build_named(
        event_type: &str,
        correlation_id: CorrelationId,
        timestamp: DateTime<Utc>,
        lead: Option<&LeadSnapshot>,
        summary: Option<&SummarySnapshot>,
    ) -> Result<Self> {
        let event_type: EventType = event_type.parse()?;
        Self::build(event_type, correlation_id, timestamp, lead, summary)
    }

    /// Event this payload announces.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Correlation identifier embedded in the body.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Lead the payload is about, if any.
    pub fn subject_id(&self) -> Option<LeadId> {
        self.subject_id
    }

    /// Unix seconds embedded as `timestamp`.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Structured form, retained as the run's `payload_preview`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Exact bytes that are hashed, signed and sent.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of [`Self::as_bytes`].
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Serializes a JSON value in canonical form.
///
/// # Errors
///
/// Returns `DeliveryError::InternalError` if serialization fails.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(&canonicalize(value.clone()))
        .map_err(|e| DeliveryError::internal(format!("payload serialization failed: {e}")))
}

/// Lowercase hex SHA-256 digest.
pub fn payload_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Rebuilds every object with its keys inserted in sorted order.
///
/// Sorting on insertion keeps the output stable whether or not
/// `serde_json` preserves insertion order in this build.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| DeliveryError::internal(format!("payload encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use gdc_core::{PrioritySubject, SummaryCounts};
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 30, 0).unwrap()
    }

    fn lead() -> LeadSnapshot {
        LeadSnapshot {
            id: LeadId::new(),
            business_name: "Harbor Dental".to_string(),
            stage: "Contacted".to_string(),
            phone: "555-0199".to_string(),
            next_action: "Send proposal".to_string(),
            next_action_due: Some(at() + Duration::days(1)),
            value_estimate: 4_200.0,
            created_at: at(),
            first_contact_date: at(),
            last_interaction_date: None,
        }
    }

    #[test]
    fn envelope_fields_are_always_present() {
        let correlation_id = CorrelationId::new();
        let payload =
            Payload::build(EventType::DailySummary, correlation_id, at(), None, None).unwrap();

        assert_eq!(
            payload.value(),
            &json!({
                "correlation_id": correlation_id.to_string(),
                "event_type": "daily.summary",
                "timestamp": at().timestamp(),
            })
        );
        assert_eq!(payload.subject_id(), None);
    }

    #[test]
    fn lead_projection_is_embedded_with_top_level_id() {
        let lead = lead();
        let payload =
            Payload::build(EventType::LeadCreated, CorrelationId::new(), at(), Some(&lead), None)
                .unwrap();

        let value = payload.value();
        assert_eq!(value["lead_id"], lead.id.to_string());
        assert_eq!(value["lead"]["business_name"], "Harbor Dental");
        assert_eq!(value["lead"]["stage"], "Contacted");
        assert_eq!(value["lead"]["next_action_due"], (at() + Duration::days(1)).timestamp());
        assert!(value["lead"].get("value_estimate").is_none());
        assert_eq!(payload.subject_id(), Some(lead.id));
    }

    #[test]
    fn missing_due_date_serializes_as_null() {
        let mut lead = lead();
        lead.next_action_due = None;
        let payload =
            Payload::build(EventType::LeadOverdue, CorrelationId::new(), at(), Some(&lead), None)
                .unwrap();

        assert!(payload.value()["lead"]["next_action_due"].is_null());
    }

    #[test]
    fn canonical_bytes_are_compact_and_sorted() {
        let correlation_id = CorrelationId::new();
        let payload =
            Payload::build(EventType::DailySummary, correlation_id, at(), None, None).unwrap();

        let expected = format!(
            concat!(
                r#"{{"correlation_id":"{}","#,
                r#""event_type":"daily.summary","timestamp":{}}}"#
            ),
            correlation_id,
            at().timestamp()
        );
        assert_eq!(payload.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn summary_is_embedded_verbatim() {
        let summary = SummarySnapshot {
            counts: SummaryCounts { new_leads: 2, overdue: 1, due_today: 3, stale: 0 },
            top_priorities: vec![PrioritySubject {
                lead_id: "abc".to_string(),
                business_name: "Acme".to_string(),
                stage: "New".to_string(),
                next_action_due: None,
            }],
        };
        let correlation_id = CorrelationId::new();
        let payload =
            Payload::build(EventType::DailySummary, correlation_id, at(), None, Some(&summary))
                .unwrap();

        assert_eq!(payload.value()["summary"], serde_json::to_value(&summary).unwrap());
    }

    #[test]
    fn retained_preview_rehashes_to_stored_hash() {
        let lead = lead();
        let payload =
            Payload::build(EventType::LeadCreated, CorrelationId::new(), at(), Some(&lead), None)
                .unwrap();

        let rehashed = payload_hash(&canonical_bytes(payload.value()).unwrap());
        assert_eq!(rehashed, payload.hash());
        assert_eq!(payload.hash().len(), 64);
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let err = Payload::build_named("lead.updated", CorrelationId::new(), at(), None, None)
            .unwrap_err();

        assert!(matches!(err, DeliveryError::InvalidEventType { .. }));
    }
}
