//! Operator-facing summary of recent automation activity.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use gdc_core::{DeliveryRun, EventType};
use gdc_delivery::RunLedger;
use serde::Serialize;

/// Number of runs listed in [`AutomationHealth::recent_runs`].
pub const RECENT_RUNS_LIMIT: usize = 5;

/// Snapshot of automation health at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationHealth {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Failed runs created in the last 24 hours.
    pub failures_24h: i64,
    /// Latest successful daily summary.
    pub last_daily_summary: Option<DeliveryRun>,
    /// Most recent run per event type, keyed by wire name.
    pub latest_by_event: BTreeMap<String, DeliveryRun>,
    /// Latest runs of any type, newest first.
    pub recent_runs: Vec<DeliveryRun>,
}

impl AutomationHealth {
    /// Reads the ledger as of `now`.
    ///
    /// # Errors
    ///
    /// Fails when any ledger query fails.
    pub async fn collect(ledger: &dyn RunLedger, now: DateTime<Utc>) -> Result<Self> {
        let failures_24h = ledger
            .count_failures_since(now - Duration::hours(24))
            .await
            .context("Failed to count recent failures")?;

        let last_daily_summary = ledger
            .find_latest(EventType::DailySummary, true)
            .await
            .context("Failed to read last daily summary")?;

        let mut latest_by_event = BTreeMap::new();
        for event_type in EventType::ALL {
            if let Some(run) = ledger
                .find_latest(event_type, false)
                .await
                .with_context(|| format!("Failed to read latest {event_type} run"))?
            {
                latest_by_event.insert(event_type.as_str().to_string(), run);
            }
        }

        let recent_runs = ledger
            .find_recent(RECENT_RUNS_LIMIT)
            .await
            .context("Failed to read recent runs")?;

        Ok(Self {
            generated_at: now,
            failures_24h,
            last_daily_summary,
            latest_by_event,
            recent_runs,
        })
    }

    /// Whether nothing failed in the last 24 hours.
    pub fn is_healthy(&self) -> bool {
        self.failures_24h == 0
    }
}
