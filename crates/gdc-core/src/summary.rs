//! Daily-summary computation.
//!
//! Builds the digest embedded in `daily.summary` payloads: counts per
//! attention category plus the top of the priority ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::{LeadId, LeadSnapshot},
    priority::{prioritize, PriorityPolicy},
};

/// Default number of leads listed in `top_priorities`.
pub const DEFAULT_PRIORITY_LIMIT: usize = 5;

/// Lead counts by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    /// Leads created today.
    pub new_leads: usize,
    /// Leads with a next action due before now.
    pub overdue: usize,
    /// Leads with a next action due today, whether or not it has passed.
    pub due_today: usize,
    /// Leads without contact within the stale threshold.
    pub stale: usize,
}

/// Compact projection of a ranked lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritySubject {
    /// Lead identifier.
    pub lead_id: String,
    /// Business name.
    pub business_name: String,
    /// Pipeline stage name.
    pub stage: String,
    /// Next-action due time as Unix seconds.
    pub next_action_due: Option<i64>,
}

impl From<&LeadSnapshot> for PrioritySubject {
    fn from(lead: &LeadSnapshot) -> Self {
        Self {
            lead_id: lead.id.to_string(),
            business_name: lead.business_name.clone(),
            stage: lead.stage.clone(),
            next_action_due: lead.next_action_due.map(|due| due.timestamp()),
        }
    }
}

/// Daily digest of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    /// Counts by category.
    pub counts: SummaryCounts,
    /// Highest-priority leads, most urgent first.
    pub top_priorities: Vec<PrioritySubject>,
}

/// Computes the daily digest for `now`.
pub fn build_daily_summary(
    leads: &[LeadSnapshot],
    now: DateTime<Utc>,
    policy: &PriorityPolicy,
    limit: usize,
) -> SummarySnapshot {
    let today = now.date_naive();

    let counts = SummaryCounts {
        new_leads: leads.iter().filter(|lead| lead.created_at.date_naive() == today).count(),
        overdue: leads.iter().filter(|lead| lead.is_overdue(now)).count(),
        due_today: leads.iter().filter(|lead| lead.is_due_on(today)).count(),
        stale: leads.iter().filter(|lead| lead.is_stale(now, policy.stale_threshold)).count(),
    };

    let top_priorities = prioritize(leads, now, policy)
        .into_iter()
        .take(limit)
        .map(|ranked| PrioritySubject::from(ranked.lead))
        .collect();

    SummarySnapshot { counts, top_priorities }
}

/// Identifiers of the leads whose next action is overdue at `now`.
pub fn overdue_leads(leads: &[LeadSnapshot], now: DateTime<Utc>) -> Vec<LeadId> {
    leads.iter().filter(|lead| lead.is_overdue(now)).map(|lead| lead.id).collect()
}
