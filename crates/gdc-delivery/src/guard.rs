//! Duplicate suppression for scheduled notifications.
//!
//! The scheduler decides when to run; the guard only answers whether an
//! event already went out successfully on a given day.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use gdc_core::{EventType, LeadId};

use crate::{error::Result, ledger::RunLedger};

/// Read-only view of the ledger answering "already sent today?".
#[derive(Clone)]
pub struct DuplicateGuard {
    ledger: Arc<dyn RunLedger>,
}

impl DuplicateGuard {
    /// Creates a guard over a ledger.
    pub fn new(ledger: Arc<dyn RunLedger>) -> Self {
        Self { ledger }
    }

    /// Whether a successful run of `event_type` was created on `day` (UTC).
    ///
    /// With `subject` set only runs about that lead count, which is how
    /// `lead.overdue` is checked. Daily summaries pass `None`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::StorageError` if the ledger query fails.
    pub async fn already_sent(
        &self,
        event_type: EventType,
        day: NaiveDate,
        subject: Option<LeadId>,
    ) -> Result<bool> {
        let (start, end) = day_bounds(day);
        let sent = self.ledger.exists_success_between(event_type, subject, start, end).await?;

        tracing::debug!(
            event_type = %event_type,
            day = %day,
            subject = ?subject.map(|id| id.to_string()),
            sent,
            "duplicate guard checked"
        );

        Ok(sent)
    }
}

/// `[day 00:00, next day 00:00)` in UTC.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}
