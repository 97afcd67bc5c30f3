//! Deterministic lead prioritization.
//!
//! Ranks leads into four buckets (overdue, due today, stale, everything
//! else) and orders each bucket by descending estimated value. The ranking
//! is a pure function of the lead set and the supplied "now"; it drives
//! both the dashboard list and the daily-summary payload.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LeadSnapshot;

/// Default number of days without contact before a lead counts as stale.
pub const DEFAULT_STALE_DAYS: u32 = 7;

/// Priority bucket of a lead. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityRank {
    /// Next action due strictly before now.
    Overdue = 1,
    /// Next action due later today.
    DueToday = 2,
    /// No contact within the stale threshold.
    Stale = 3,
    /// Everything else.
    Other = 4,
}

impl PriorityRank {
    /// Numeric rank, 1 (most urgent) through 4.
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// Tunables for the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityPolicy {
    /// Minimum time without contact for a lead to be stale.
    pub stale_threshold: Duration,
}

impl PriorityPolicy {
    /// Policy with a stale threshold expressed in days.
    pub fn from_stale_days(days: u32) -> Self {
        Self { stale_threshold: Duration::days(i64::from(days)) }
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::from_stale_days(DEFAULT_STALE_DAYS)
    }
}

/// A lead paired with its computed rank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedLead<'a> {
    /// Computed bucket.
    pub rank: PriorityRank,
    /// The ranked lead.
    pub lead: &'a LeadSnapshot,
}

/// Computes the priority bucket of one lead.
///
/// Buckets are checked in order, so an overdue lead is never reported as
/// stale even when it has not been contacted for weeks.
pub fn rank(lead: &LeadSnapshot, now: DateTime<Utc>, policy: &PriorityPolicy) -> PriorityRank {
    if lead.is_overdue(now) {
        PriorityRank::Overdue
    } else if lead.is_due_on(now.date_naive()) {
        PriorityRank::DueToday
    } else if lead.is_stale(now, policy.stale_threshold) {
        PriorityRank::Stale
    } else {
        PriorityRank::Other
    }
}

/// Ranks and orders every lead.
///
/// Ties on rank are broken by descending `value_estimate`; leads equal on
/// both keep their input order.
pub fn prioritize<'a>(
    leads: &'a [LeadSnapshot],
    now: DateTime<Utc>,
    policy: &PriorityPolicy,
) -> Vec<RankedLead<'a>> {
    let mut ranked: Vec<RankedLead<'a>> =
        leads.iter().map(|lead| RankedLead { rank: rank(lead, now, policy), lead }).collect();
    ranked.sort_by(compare);
    ranked
}

fn compare(a: &RankedLead<'_>, b: &RankedLead<'_>) -> Ordering {
    a.rank.cmp(&b.rank).then_with(|| b.lead.value_estimate.total_cmp(&a.lead.value_estimate))
}
