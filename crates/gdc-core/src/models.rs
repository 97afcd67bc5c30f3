//! Core domain models and strongly-typed identifiers.
//!
//! Defines the delivery run record, the closed set of automation event
//! types, and the read-only CRM projections (leads, interactions, stage
//! changes) that the trigger layer hands to the delivery core. Identifier
//! newtypes carry their own database encoding so they cannot be mixed up.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::CoreError;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <Uuid as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
                Ok(Self(uuid))
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one delivery run row.
    RunId
);

uuid_id!(
    /// Identifier shared by every attempt of one logical event occurrence.
    ///
    /// Generated once per event and embedded in the payload itself, so the
    /// receiver can trace a delivery back to its run.
    CorrelationId
);

uuid_id!(
    /// Identifier of a lead in the CRM.
    LeadId
);

/// Automation event types.
///
/// The set is closed: anything else is rejected at parse time with
/// `CoreError::InvalidEventType`, before a payload is built or a run is
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// A lead was created.
    #[serde(rename = "lead.created")]
    LeadCreated,
    /// A lead's next action is past due.
    #[serde(rename = "lead.overdue")]
    LeadOverdue,
    /// Once-a-day pipeline digest.
    #[serde(rename = "daily.summary")]
    DailySummary,
}

impl EventType {
    /// Every supported event type.
    pub const ALL: [Self; 3] = [Self::LeadCreated, Self::LeadOverdue, Self::DailySummary];

    /// Wire name used in payloads, headers and the ledger.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadCreated => "lead.created",
            Self::LeadOverdue => "lead.overdue",
            Self::DailySummary => "daily.summary",
        }
    }

    /// Path appended to the webhook base URL for this event.
    pub const fn path_suffix(self) -> &'static str {
        match self {
            Self::LeadCreated => "gdc-lead-created",
            Self::LeadOverdue => "gdc-lead-overdue",
            Self::DailySummary => "gdc-daily-summary",
        }
    }

    /// Whether runs of this type are tied to a single lead.
    pub const fn is_lead_scoped(self) -> bool {
        matches!(self, Self::LeadCreated | Self::LeadOverdue)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| CoreError::InvalidEventType(s.to_string()))
    }
}

impl sqlx::Type<PgDb> for EventType {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as sqlx::Type<PgDb>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse::<Self>()?)
    }
}

impl sqlx::Encode<'_, PgDb> for EventType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Derived lifecycle state of a delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no attempt made yet.
    Pending,
    /// An attempt received a 2xx response.
    Succeeded,
    /// At least one attempt was made and none succeeded.
    Failed,
}

/// One delivery attempt sequence for one logical event occurrence.
///
/// Created before the first network call, mutated in place after every
/// attempt, and left untouched once it succeeds or exhausts its retry
/// budget. The row doubles as the duplicate-suppression record for daily
/// and overdue notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryRun {
    /// Unique identifier for this run.
    pub id: RunId,

    /// Correlation identifier embedded in the payload.
    pub correlation_id: CorrelationId,

    /// Event this run delivers.
    pub event_type: EventType,

    /// Lead the event is about; absent for daily summaries.
    pub subject_id: Option<LeadId>,

    /// Full URL the payload is posted to.
    pub target_url: String,

    /// Lowercase hex SHA-256 of the canonical payload bytes.
    pub payload_hash: String,

    /// Attempts made so far.
    pub attempts: i32,

    /// HTTP status of the latest attempt, if the endpoint answered.
    pub status_code: Option<i32>,

    /// Whether the latest attempt succeeded.
    pub success: bool,

    /// Error recorded by the latest attempt.
    pub error_message: Option<String>,

    /// Bounded prefix of the latest response body.
    pub response_snippet: Option<String>,

    /// Wall time of the latest attempt in milliseconds.
    pub duration_ms: Option<i64>,

    /// When the latest attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Headers built for the latest attempt.
    pub request_headers: Json<BTreeMap<String, String>>,

    /// The payload exactly as sent.
    pub payload_preview: Json<serde_json::Value>,

    /// When the run was created. Never changes.
    pub created_at: DateTime<Utc>,
}

impl DeliveryRun {
    /// Creates a run in its pending state with zero attempts.
    pub fn pending(
        correlation_id: CorrelationId,
        event_type: EventType,
        subject_id: Option<LeadId>,
        target_url: impl Into<String>,
        payload_hash: impl Into<String>,
        payload_preview: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            correlation_id,
            event_type,
            subject_id,
            target_url: target_url.into(),
            payload_hash: payload_hash.into(),
            attempts: 0,
            status_code: None,
            success: false,
            error_message: None,
            response_snippet: None,
            duration_ms: None,
            last_attempt_at: None,
            request_headers: Json(BTreeMap::new()),
            payload_preview: Json(payload_preview),
            created_at,
        }
    }

    /// Number of attempts made, as an unsigned count.
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts).unwrap_or(0)
    }

    /// Lifecycle state derived from the attempt fields.
    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Succeeded
        } else if self.attempts == 0 {
            RunStatus::Pending
        } else {
            RunStatus::Failed
        }
    }

    /// Whether the run was created on `day` (UTC).
    pub fn created_on(&self, day: NaiveDate) -> bool {
        self.created_at.date_naive() == day
    }
}

/// Read-only projection of a lead as the CRM currently stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSnapshot {
    /// Lead identifier.
    pub id: LeadId,

    /// Business the lead represents.
    pub business_name: String,

    /// Current pipeline stage name.
    pub stage: String,

    /// Contact phone number.
    #[serde(default)]
    pub phone: String,

    /// Description of the next planned step.
    #[serde(default)]
    pub next_action: String,

    /// When the next step is due.
    #[serde(default)]
    pub next_action_due: Option<DateTime<Utc>>,

    /// Estimated monthly value, used to break ranking ties.
    #[serde(default)]
    pub value_estimate: f64,

    /// When the lead record was created.
    pub created_at: DateTime<Utc>,

    /// When the business was first contacted.
    pub first_contact_date: DateTime<Utc>,

    /// Most recent logged interaction.
    #[serde(default)]
    pub last_interaction_date: Option<DateTime<Utc>>,
}

impl LeadSnapshot {
    /// Latest contact: the last interaction, falling back to first contact.
    pub fn last_touch(&self) -> DateTime<Utc> {
        self.last_interaction_date.unwrap_or(self.first_contact_date)
    }

    /// Whether the next action is due strictly before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.next_action_due.is_some_and(|due| due < now)
    }

    /// Whether the next action falls on the given calendar date.
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.next_action_due.is_some_and(|due| due.date_naive() == day)
    }

    /// Whether nothing has happened with this lead for at least `threshold`.
    ///
    /// Uses the exact elapsed duration, not calendar-day truncation.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.last_touch() >= threshold
    }

    /// Whole 24-hour periods elapsed since the last touch.
    pub fn days_since_last_interaction(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_touch()).num_days()
    }
}

/// A logged interaction with a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    /// Lead the interaction belongs to.
    pub lead_id: LeadId,
    /// When the interaction was logged.
    pub created_at: DateTime<Utc>,
}

/// A recorded move of a lead between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    /// Lead that moved.
    pub lead_id: LeadId,
    /// Stage before the move.
    #[serde(default)]
    pub from_stage: Option<String>,
    /// Stage after the move.
    pub to_stage: String,
    /// When the move happened.
    pub changed_at: DateTime<Utc>,
}

/// Export of the CRM state the automations read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmSnapshot {
    /// Active leads.
    #[serde(default)]
    pub leads: Vec<LeadSnapshot>,
    /// Logged interactions.
    #[serde(default)]
    pub interactions: Vec<InteractionSnapshot>,
    /// Stage movements.
    #[serde(default)]
    pub stage_changes: Vec<StageChange>,
}

impl CrmSnapshot {
    /// Finds a lead by identifier.
    pub fn lead(&self, id: LeadId) -> Option<&LeadSnapshot> {
        self.leads.iter().find(|lead| lead.id == id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    fn lead_touched_at(first_contact: DateTime<Utc>, last: Option<DateTime<Utc>>) -> LeadSnapshot {
        LeadSnapshot {
            id: LeadId::new(),
            business_name: "Acme Ltd".to_string(),
            stage: "Warm".to_string(),
            phone: "0700000000".to_string(),
            next_action: String::new(),
            next_action_due: None,
            value_estimate: 0.0,
            created_at: first_contact,
            first_contact_date: first_contact,
            last_interaction_date: last,
        }
    }

    #[test]
    fn event_type_round_trips_through_wire_name() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = "lead.updated".parse::<EventType>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidEventType(name) if name == "lead.updated"));
    }

    #[test]
    fn event_type_serializes_as_wire_name() {
        assert_eq!(serde_json::to_value(EventType::DailySummary).unwrap(), json!("daily.summary"));
        assert_eq!(EventType::LeadOverdue.path_suffix(), "gdc-lead-overdue");
        assert!(!EventType::DailySummary.is_lead_scoped());
    }

    #[test]
    fn pending_run_starts_with_no_attempts() {
        let run = DeliveryRun::pending(
            CorrelationId::new(),
            EventType::LeadCreated,
            Some(LeadId::new()),
            "http://localhost/webhook/gdc-lead-created",
            "abc",
            json!({}),
            Utc::now(),
        );

        assert_eq!(run.attempts, 0);
        assert!(!run.success);
        assert_eq!(run.status(), RunStatus::Pending);
    }

    #[test]
    fn staleness_uses_exact_duration() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let threshold = Duration::days(7);

        let exactly_seven = lead_touched_at(now - Duration::days(7), None);
        let almost_seven = lead_touched_at(now - Duration::days(7) + Duration::minutes(1), None);

        assert!(exactly_seven.is_stale(now, threshold));
        assert!(!almost_seven.is_stale(now, threshold));
        assert_eq!(almost_seven.days_since_last_interaction(now), 6);
    }

    #[test]
    fn last_interaction_overrides_first_contact() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let lead = lead_touched_at(now - Duration::days(30), Some(now - Duration::days(1)));

        assert_eq!(lead.last_touch(), now - Duration::days(1));
        assert!(!lead.is_stale(now, Duration::days(7)));
    }
}
