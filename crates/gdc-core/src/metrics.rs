//! Pipeline consistency metrics.
//!
//! All windows are half-open, `[start, end)`. Every function here is pure
//! over a [`CrmSnapshot`], so the dashboard can compute the figures from the
//! same export the automations read.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CrmSnapshot, LeadId};

/// Length of both the calendar and rolling windows.
const WINDOW_DAYS: i64 = 7;

/// Half-open time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl Window {
    /// Creates a window from its bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Monday 00:00 UTC of the week containing `now`, spanning seven days.
    pub fn calendar_week(now: DateTime<Utc>) -> Self {
        let days_since_monday = i64::from(now.weekday().num_days_from_monday());
        let monday = now.date_naive() - Duration::days(days_since_monday);
        let start = monday.and_time(NaiveTime::MIN).and_utc();
        Self { start, end: start + Duration::days(WINDOW_DAYS) }
    }

    /// The seven days ending at `now`.
    pub fn rolling(now: DateTime<Utc>) -> Self {
        Self { start: now - Duration::days(WINDOW_DAYS), end: now }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Follow-up completion figures for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowUpRate {
    /// Completed over due, as a percentage. `None` when nothing was due.
    pub rate: Option<f64>,
    /// Leads with a next action due in the window.
    pub due: usize,
    /// Due leads with an interaction at or after the due time, in the window.
    pub completed: usize,
}

/// A metric reported for both windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowedMetric<T> {
    /// Calendar week containing now.
    pub week: T,
    /// Seven days ending at now.
    pub rolling: T,
}

/// Dashboard consistency figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    /// Average minutes from lead creation to first interaction.
    pub speed_to_lead: WindowedMetric<Option<f64>>,
    /// Follow-up completion rate.
    pub follow_up_completion_rate: WindowedMetric<FollowUpRate>,
    /// Number of stage changes.
    pub stage_movements: WindowedMetric<usize>,
}

impl ConsistencyMetrics {
    /// Computes every metric for the calendar week and the rolling window.
    pub fn compute(snapshot: &CrmSnapshot, now: DateTime<Utc>) -> Self {
        let week = Window::calendar_week(now);
        let rolling = Window::rolling(now);

        Self {
            speed_to_lead: WindowedMetric {
                week: speed_to_lead_minutes(snapshot, week),
                rolling: speed_to_lead_minutes(snapshot, rolling),
            },
            follow_up_completion_rate: WindowedMetric {
                week: follow_up_completion_rate(snapshot, week),
                rolling: follow_up_completion_rate(snapshot, rolling),
            },
            stage_movements: WindowedMetric {
                week: stage_movement_count(snapshot, week),
                rolling: stage_movement_count(snapshot, rolling),
            },
        }
    }
}

/// Average minutes between creation and first interaction for leads created
/// in the window. Leads never contacted are ignored.
pub fn speed_to_lead_minutes(snapshot: &CrmSnapshot, window: Window) -> Option<f64> {
    let mut first_interaction: HashMap<LeadId, DateTime<Utc>> = HashMap::new();
    for interaction in &snapshot.interactions {
        first_interaction
            .entry(interaction.lead_id)
            .and_modify(|first| *first = (*first).min(interaction.created_at))
            .or_insert(interaction.created_at);
    }

    let response_seconds: Vec<i64> = snapshot
        .leads
        .iter()
        .filter(|lead| window.contains(lead.created_at))
        .filter_map(|lead| {
            let first = first_interaction.get(&lead.id)?;
            Some((*first - lead.created_at).num_seconds())
        })
        .collect();

    if response_seconds.is_empty() {
        return None;
    }

    let average = response_seconds.iter().sum::<i64>() as f64 / response_seconds.len() as f64;
    Some(round2(average / 60.0))
}

/// Share of leads due in the window that were followed up in time.
pub fn follow_up_completion_rate(snapshot: &CrmSnapshot, window: Window) -> FollowUpRate {
    let due: Vec<_> = snapshot
        .leads
        .iter()
        .filter_map(|lead| {
            let due = lead.next_action_due.filter(|due| window.contains(*due))?;
            Some((lead.id, due))
        })
        .collect();

    if due.is_empty() {
        return FollowUpRate { rate: None, due: 0, completed: 0 };
    }

    let completed = due
        .iter()
        .filter(|(lead_id, due_at)| {
            snapshot.interactions.iter().any(|interaction| {
                interaction.lead_id == *lead_id
                    && interaction.created_at >= *due_at
                    && window.contains(interaction.created_at)
            })
        })
        .count();

    let rate = round2(completed as f64 / due.len() as f64 * 100.0);
    FollowUpRate { rate: Some(rate), due: due.len(), completed }
}

/// Number of stage changes recorded in the window.
pub fn stage_movement_count(snapshot: &CrmSnapshot, window: Window) -> usize {
    snapshot.stage_changes.iter().filter(|change| window.contains(change.changed_at)).count()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::{InteractionSnapshot, LeadSnapshot, StageChange};

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    fn week() -> Window {
        Window::new(monday(), monday() + Duration::days(7))
    }

    fn lead(created_at: DateTime<Utc>, next_action_due: Option<DateTime<Utc>>) -> LeadSnapshot {
        LeadSnapshot {
            id: LeadId::new(),
            business_name: "Acme".to_string(),
            stage: "New".to_string(),
            phone: String::new(),
            next_action: String::new(),
            next_action_due,
            value_estimate: 0.0,
            created_at,
            first_contact_date: created_at,
            last_interaction_date: None,
        }
    }

    fn touch(lead: &LeadSnapshot, at: DateTime<Utc>) -> InteractionSnapshot {
        InteractionSnapshot { lead_id: lead.id, created_at: at }
    }

    #[test]
    fn speed_to_lead_averages_contacted_leads_in_window() {
        let contacted = lead(monday() + Duration::hours(1), None);
        let silent = lead(monday() + Duration::hours(3), None);
        let older = lead(monday() - Duration::days(2), None);

        let snapshot = CrmSnapshot {
            interactions: vec![
                touch(&contacted, monday() + Duration::hours(2)),
                touch(&older, monday() + Duration::hours(1)),
            ],
            leads: vec![contacted, silent, older],
            stage_changes: vec![],
        };

        assert_eq!(speed_to_lead_minutes(&snapshot, week()), Some(60.0));

        let later = Window::new(monday() + Duration::days(10), monday() + Duration::days(17));
        assert_eq!(speed_to_lead_minutes(&snapshot, later), None);
    }

    #[test]
    fn follow_up_counts_each_lead_once() {
        let done = lead(monday() + Duration::hours(1), Some(monday() + Duration::days(1)));
        let missed = lead(monday() + Duration::hours(2), Some(monday() + Duration::days(2)));

        let snapshot = CrmSnapshot {
            interactions: vec![
                touch(&done, monday() + Duration::days(1) + Duration::hours(1)),
                touch(&done, monday() + Duration::days(2)),
                touch(&missed, monday() + Duration::days(1)),
            ],
            leads: vec![done, missed],
            stage_changes: vec![],
        };

        let result = follow_up_completion_rate(&snapshot, week());
        assert_eq!(result, FollowUpRate { rate: Some(50.0), due: 2, completed: 1 });

        let later = Window::new(monday() + Duration::days(10), monday() + Duration::days(17));
        assert_eq!(
            follow_up_completion_rate(&snapshot, later),
            FollowUpRate { rate: None, due: 0, completed: 0 }
        );
    }

    #[test]
    fn stage_movements_only_count_window() {
        let change = |at| StageChange {
            lead_id: LeadId::new(),
            from_stage: Some("New".to_string()),
            to_stage: "Warm".to_string(),
            changed_at: at,
        };
        let snapshot = CrmSnapshot {
            stage_changes: vec![
                change(monday() + Duration::days(1)),
                change(monday() + Duration::days(2)),
                change(monday() + Duration::days(9)),
            ],
            ..CrmSnapshot::default()
        };

        assert_eq!(stage_movement_count(&snapshot, week()), 2);
    }

    #[test]
    fn calendar_week_starts_on_monday_midnight() {
        let thursday = Utc.with_ymd_and_hms(2026, 1, 8, 17, 45, 0).unwrap();
        let window = Window::calendar_week(thursday);

        assert_eq!(window.start, monday());
        assert_eq!(window.end, monday() + Duration::days(7));
        assert_eq!(Window::rolling(thursday).start, thursday - Duration::days(7));
    }

    #[test]
    fn compute_reports_both_windows() {
        let now = monday() + Duration::days(3);
        let snapshot = CrmSnapshot {
            stage_changes: vec![StageChange {
                lead_id: LeadId::new(),
                from_stage: None,
                to_stage: "New".to_string(),
                changed_at: monday() - Duration::days(1),
            }],
            ..CrmSnapshot::default()
        };

        let metrics = ConsistencyMetrics::compute(&snapshot, now);
        assert_eq!(metrics.stage_movements, WindowedMetric { week: 0, rolling: 1 });
        assert_eq!(metrics.speed_to_lead.week, None);
    }
}
