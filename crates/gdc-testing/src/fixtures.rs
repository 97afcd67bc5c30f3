//! Lead and snapshot builders.
//!
//! Defaults are pinned to [`fixed_now`] so ranking and summary assertions do
//! not depend on when the test runs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gdc_core::{CrmSnapshot, InteractionSnapshot, LeadId, LeadSnapshot, StageChange};

/// Reference instant for fixtures: Tuesday 2026-03-10 10:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).single().unwrap_or_default()
}

/// Builder for test leads.
#[derive(Debug, Clone)]
pub struct LeadBuilder {
    lead: LeadSnapshot,
}

impl LeadBuilder {
    /// A lead created a month ago, touched yesterday, nothing due.
    pub fn new(business_name: impl Into<String>) -> Self {
        let now = fixed_now();
        Self {
            lead: LeadSnapshot {
                id: LeadId::new(),
                business_name: business_name.into(),
                stage: "New".to_string(),
                phone: "555-0100".to_string(),
                next_action: "Follow up".to_string(),
                next_action_due: None,
                value_estimate: 0.0,
                created_at: now - Duration::days(30),
                first_contact_date: now - Duration::days(30),
                last_interaction_date: Some(now - Duration::days(1)),
            },
        }
    }

    /// Sets the lead id.
    #[must_use]
    pub fn id(mut self, id: LeadId) -> Self {
        self.lead.id = id;
        self
    }

    /// Sets the pipeline stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.lead.stage = stage.into();
        self
    }

    /// Sets the estimated value.
    #[must_use]
    pub fn value(mut self, value: f64) -> Self {
        self.lead.value_estimate = value;
        self
    }

    /// Sets the next-action due time.
    #[must_use]
    pub fn due(mut self, due: DateTime<Utc>) -> Self {
        self.lead.next_action_due = Some(due);
        self
    }

    /// Makes the next action due `ago` before [`fixed_now`].
    #[must_use]
    pub fn overdue_by(self, ago: Duration) -> Self {
        self.due(fixed_now() - ago)
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.lead.created_at = at;
        self
    }

    /// Sets the first-contact time.
    #[must_use]
    pub fn first_contact(mut self, at: DateTime<Utc>) -> Self {
        self.lead.first_contact_date = at;
        self
    }

    /// Sets or clears the last interaction time.
    #[must_use]
    pub fn last_interaction(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.lead.last_interaction_date = at;
        self
    }

    /// Finishes the lead.
    pub fn build(self) -> LeadSnapshot {
        self.lead
    }
}

/// Builder for CRM snapshots.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    snapshot: CrmSnapshot,
}

impl SnapshotBuilder {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lead.
    #[must_use]
    pub fn lead(mut self, lead: LeadSnapshot) -> Self {
        self.snapshot.leads.push(lead);
        self
    }

    /// Adds an interaction with a lead.
    #[must_use]
    pub fn interaction(mut self, lead_id: LeadId, at: DateTime<Utc>) -> Self {
        self.snapshot.interactions.push(InteractionSnapshot { lead_id, created_at: at });
        self
    }

    /// Adds a stage change.
    #[must_use]
    pub fn stage_change(
        mut self,
        lead_id: LeadId,
        to_stage: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        self.snapshot.stage_changes.push(StageChange {
            lead_id,
            from_stage: None,
            to_stage: to_stage.into(),
            changed_at: at,
        });
        self
    }

    /// Finishes the snapshot.
    pub fn build(self) -> CrmSnapshot {
        self.snapshot
    }
}
