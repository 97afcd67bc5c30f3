//! Automation triggers: lead created, overdue scan, daily summary.
//!
//! The service decides *whether* to send; the dispatcher decides *how*.
//! Scheduling lives outside this crate. Whoever calls [`AutomationService::run`]
//! (cron, a systemd timer, an operator) may call it as often as it likes:
//! the duplicate guard keeps overdue notices to one success per lead per
//! day and the summary to one success per day.

use std::sync::Arc;

use anyhow::{Context, Result};
use gdc_core::{
    build_daily_summary, summary::DEFAULT_PRIORITY_LIMIT, DeliveryRun, EventType, LeadSnapshot,
    PriorityPolicy,
};
use gdc_delivery::{DuplicateGuard, WebhookDispatcher};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Trigger-layer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationSettings {
    /// Master switch; when off every trigger is a no-op.
    pub enabled: bool,
    /// Ranking used for the summary's priority list.
    pub priority_policy: PriorityPolicy,
    /// Number of leads in the summary's priority list.
    pub priority_limit: usize,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority_policy: PriorityPolicy::default(),
            priority_limit: DEFAULT_PRIORITY_LIMIT,
        }
    }
}

/// Which scheduled jobs a run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSelection {
    /// Scan for overdue leads.
    pub overdue: bool,
    /// Send the daily summary.
    pub daily_summary: bool,
}

impl RunSelection {
    /// Both jobs.
    pub const ALL: Self = Self { overdue: true, daily_summary: true };

    /// Selecting nothing means selecting everything.
    pub fn resolve(self) -> Self {
        if !self.overdue && !self.daily_summary {
            Self::ALL
        } else {
            self
        }
    }
}

/// Outcome of an overdue scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverdueReport {
    /// Leads a delivery was attempted for.
    pub sent: usize,
    /// Leads already notified successfully today.
    pub skipped: usize,
    /// Runs created by this scan, in lead order.
    pub runs: Vec<DeliveryRun>,
}

impl OverdueReport {
    /// Runs that ended in a 2xx.
    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|run| run.success).count()
    }
}

/// Outcome of the daily summary job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DailySummaryOutcome {
    /// A delivery was attempted.
    Sent {
        /// The resulting run.
        run: Box<DeliveryRun>,
    },
    /// A successful summary already exists for today.
    AlreadySent,
    /// Automations are switched off; nothing was attempted.
    Disabled,
}

/// Outcome of [`AutomationService::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunReport {
    /// Automations are switched off; nothing was attempted.
    Disabled,
    /// The selected jobs ran.
    Completed {
        /// Overdue scan, when selected.
        overdue: Option<OverdueReport>,
        /// Daily summary, when selected.
        daily_summary: Option<DailySummaryOutcome>,
    },
}

/// Entry point for every automation trigger.
pub struct AutomationService {
    dispatcher: Arc<WebhookDispatcher>,
    guard: DuplicateGuard,
    settings: AutomationSettings,
}

impl AutomationService {
    /// Creates a service delivering through `dispatcher`.
    ///
    /// Duplicate checks read the dispatcher's own ledger, so runs it records
    /// are the ones that suppress repeats.
    pub fn new(dispatcher: Arc<WebhookDispatcher>, settings: AutomationSettings) -> Self {
        let guard = DuplicateGuard::new(dispatcher.ledger());
        Self { dispatcher, guard, settings }
    }

    /// Whether triggers deliver anything.
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Current settings.
    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    /// Dispatcher used for delivery.
    pub fn dispatcher(&self) -> &WebhookDispatcher {
        &self.dispatcher
    }

    /// Announces a lead the caller has just committed.
    ///
    /// Returns `None` when automations are disabled.
    ///
    /// # Errors
    ///
    /// Fails only when the run cannot be recorded; delivery failures are in
    /// the returned run.
    pub async fn notify_lead_created(&self, lead: &LeadSnapshot) -> Result<Option<DeliveryRun>> {
        if !self.settings.enabled {
            debug!(lead_id = %lead.id, "automations disabled, lead.created not sent");
            return Ok(None);
        }

        let run = self
            .dispatcher
            .notify_lead_created(lead)
            .await
            .with_context(|| format!("Failed to deliver lead.created for lead {}", lead.id))?;
        Ok(Some(run))
    }

    /// Sends `lead.overdue` for every lead past due that was not already
    /// notified successfully today.
    ///
    /// Returns an empty report when automations are disabled.
    ///
    /// # Errors
    ///
    /// Fails when the ledger cannot be queried or a run cannot be recorded.
    pub async fn run_overdue(&self, leads: &[LeadSnapshot]) -> Result<OverdueReport> {
        if !self.settings.enabled {
            debug!("automations disabled, overdue scan skipped");
            return Ok(OverdueReport::default());
        }

        let now = self.dispatcher.clock().now_utc();
        let today = now.date_naive();
        let mut report = OverdueReport::default();

        for lead in leads.iter().filter(|lead| lead.is_overdue(now)) {
            let already_sent = self
                .guard
                .already_sent(EventType::LeadOverdue, today, Some(lead.id))
                .await
                .context("Failed to check overdue notifications")?;
            if already_sent {
                report.skipped += 1;
                continue;
            }

            let run = self
                .dispatcher
                .notify_lead_overdue(lead)
                .await
                .with_context(|| format!("Failed to deliver lead.overdue for lead {}", lead.id))?;
            if !run.success {
                warn!(
                    lead_id = %lead.id,
                    correlation_id = %run.correlation_id,
                    attempts = run.attempts,
                    error = run.error_message.as_deref().unwrap_or_default(),
                    "overdue notification failed"
                );
            }
            report.sent += 1;
            report.runs.push(run);
        }

        info!(
            sent = report.sent,
            succeeded = report.succeeded(),
            skipped = report.skipped,
            "overdue scan finished"
        );
        Ok(report)
    }

    /// Sends today's summary unless one already went out or automations
    /// are disabled.
    ///
    /// # Errors
    ///
    /// Fails when the ledger cannot be queried or the run cannot be
    /// recorded.
    pub async fn run_daily_summary(&self, leads: &[LeadSnapshot]) -> Result<DailySummaryOutcome> {
        if !self.settings.enabled {
            debug!("automations disabled, daily summary skipped");
            return Ok(DailySummaryOutcome::Disabled);
        }

        let now = self.dispatcher.clock().now_utc();

        let already_sent = self
            .guard
            .already_sent(EventType::DailySummary, now.date_naive(), None)
            .await
            .context("Failed to check daily summary")?;
        if already_sent {
            info!(day = %now.date_naive(), "daily summary already sent today");
            return Ok(DailySummaryOutcome::AlreadySent);
        }

        let summary = build_daily_summary(
            leads,
            now,
            &self.settings.priority_policy,
            self.settings.priority_limit,
        );
        let run = self
            .dispatcher
            .send_daily_summary(&summary)
            .await
            .context("Failed to deliver daily summary")?;

        info!(
            correlation_id = %run.correlation_id,
            success = run.success,
            attempts = run.attempts,
            overdue = summary.counts.overdue,
            due_today = summary.counts.due_today,
            "daily summary delivered"
        );
        Ok(DailySummaryOutcome::Sent { run: Box::new(run) })
    }

    /// Runs the selected jobs in order: overdue scan, then daily summary.
    ///
    /// # Errors
    ///
    /// Propagates the first job error.
    pub async fn run(&self, selection: RunSelection, leads: &[LeadSnapshot]) -> Result<RunReport> {
        if !self.settings.enabled {
            info!("automations disabled");
            return Ok(RunReport::Disabled);
        }

        let selection = selection.resolve();

        let overdue =
            if selection.overdue { Some(self.run_overdue(leads).await?) } else { None };
        let daily_summary = if selection.daily_summary {
            Some(self.run_daily_summary(leads).await?)
        } else {
            None
        };

        Ok(RunReport::Completed { overdue, daily_summary })
    }
}
