//! Integration tests for storage repositories.
//!
//! Each test runs the production repositories against its own freshly
//! migrated database created next to the one named by `DATABASE_URL`.
//! Without `DATABASE_URL` the tests return early.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gdc_core::{
    AuditRecord, AuditSink, CoreError, CorrelationId, DeliveryRun, EventType, LeadId, Storage,
};
use serde_json::json;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    PgPool,
};
use uuid::Uuid;

/// Throwaway database owning one test's rows.
struct TestDatabase {
    admin: PgPool,
    name: String,
    storage: Storage,
}

impl TestDatabase {
    async fn create() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping storage test");
            return None;
        };
        let options: PgConnectOptions = url.parse().unwrap();

        let admin =
            PgPoolOptions::new().max_connections(1).connect_with(options.clone()).await.unwrap();
        let name = format!("gdc_test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE DATABASE \"{name}\"")).execute(&admin).await.unwrap();

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options.database(&name))
            .await
            .unwrap();
        let storage = Storage::new(pool);
        storage.migrate().await.unwrap();

        Some(Self { admin, name, storage })
    }

    async fn cleanup(self) {
        self.storage.delivery_runs.pool().close().await;
        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name))
            .execute(&self.admin)
            .await
            .unwrap();
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

fn pending_run(
    event_type: EventType,
    subject: Option<LeadId>,
    created_at: DateTime<Utc>,
) -> DeliveryRun {
    DeliveryRun::pending(
        CorrelationId::new(),
        event_type,
        subject,
        format!("http://localhost/webhook/{}", event_type.path_suffix()),
        "ab".repeat(32),
        json!({ "event_type": event_type.as_str() }),
        created_at,
    )
}

fn finished_run(
    event_type: EventType,
    subject: Option<LeadId>,
    created_at: DateTime<Utc>,
    success: bool,
) -> DeliveryRun {
    let mut run = pending_run(event_type, subject, created_at);
    run.attempts = 1;
    run.success = success;
    run.status_code = Some(if success { 200 } else { 503 });
    run.last_attempt_at = Some(created_at);
    run
}

#[tokio::test]
async fn storage_health_check() {
    let Some(db) = TestDatabase::create().await else { return };

    assert!(db.storage.health_check().await.is_ok());

    db.cleanup().await;
}

#[tokio::test]
async fn run_is_created_saved_and_found() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;
    let lead = LeadId::new();

    let mut run = pending_run(EventType::LeadCreated, Some(lead), base_time());
    let id = runs.create(&run).await.unwrap();
    assert_eq!(id, run.id);

    let stored = runs.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 0);
    assert!(!stored.success);
    assert_eq!(stored.subject_id, Some(lead));
    assert_eq!(stored.payload_preview.0["event_type"], "lead.created");

    run.attempts = 2;
    run.success = true;
    run.status_code = Some(204);
    run.error_message = None;
    run.response_snippet = Some("ok".to_string());
    run.duration_ms = Some(42);
    run.last_attempt_at = Some(base_time() + Duration::seconds(3));
    run.request_headers = Json(BTreeMap::from([(
        "X-GDC-Event".to_string(),
        "lead.created".to_string(),
    )]));
    runs.save(&run).await.unwrap();

    let stored = runs.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored, run);

    let by_correlation = runs.find_by_correlation_id(run.correlation_id).await.unwrap();
    assert_eq!(by_correlation.map(|r| r.id), Some(id));

    db.cleanup().await;
}

#[tokio::test]
async fn save_does_not_rewrite_identity_columns() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;

    let original = pending_run(EventType::DailySummary, None, base_time());
    runs.create(&original).await.unwrap();

    let mut changed = original.clone();
    changed.target_url = "http://elsewhere/webhook".to_string();
    changed.created_at = base_time() + Duration::days(1);
    changed.attempts = 1;
    runs.save(&changed).await.unwrap();

    let stored = runs.find_by_id(original.id).await.unwrap().unwrap();
    assert_eq!(stored.target_url, original.target_url);
    assert_eq!(stored.created_at, original.created_at);
    assert_eq!(stored.attempts, 1);

    db.cleanup().await;
}

#[tokio::test]
async fn saving_unknown_run_is_not_found() {
    let Some(db) = TestDatabase::create().await else { return };

    let run = finished_run(EventType::LeadOverdue, Some(LeadId::new()), base_time(), true);
    let err = db.storage.delivery_runs.save(&run).await.unwrap_err();

    assert!(matches!(err, CoreError::NotFound(_)));
    assert!(db.storage.delivery_runs.find_by_id(run.id).await.unwrap().is_none());

    db.cleanup().await;
}

#[tokio::test]
async fn duplicate_run_id_is_constraint_violation() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;

    let run = pending_run(EventType::LeadCreated, Some(LeadId::new()), base_time());
    runs.create(&run).await.unwrap();
    let err = runs.create(&run).await.unwrap_err();

    assert!(matches!(err, CoreError::ConstraintViolation(_)));

    db.cleanup().await;
}

#[tokio::test]
async fn success_lookup_respects_subject_and_window() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;
    let start = base_time();
    let end = start + Duration::days(1);
    let notified = LeadId::new();
    let failed = LeadId::new();

    runs.create(&finished_run(EventType::LeadOverdue, Some(notified), start, true))
        .await
        .unwrap();
    runs.create(&finished_run(EventType::LeadOverdue, Some(failed), start, false))
        .await
        .unwrap();

    let overdue = EventType::LeadOverdue;
    assert!(runs.exists_success_between(overdue, Some(notified), start, end).await.unwrap());
    assert!(!runs.exists_success_between(overdue, Some(failed), start, end).await.unwrap());
    assert!(!runs.exists_success_between(overdue, Some(LeadId::new()), start, end).await.unwrap());
    assert!(runs.exists_success_between(overdue, None, start, end).await.unwrap());
    assert!(!runs
        .exists_success_between(EventType::DailySummary, None, start, end)
        .await
        .unwrap());

    db.cleanup().await;
}

#[tokio::test]
async fn success_window_is_half_open() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;
    let start = base_time();
    let end = start + Duration::days(1);

    runs.create(&finished_run(EventType::DailySummary, None, end, true)).await.unwrap();

    let summary = EventType::DailySummary;
    assert!(!runs.exists_success_between(summary, None, start, end).await.unwrap());
    assert!(runs
        .exists_success_between(summary, None, end, end + Duration::days(1))
        .await
        .unwrap());

    db.cleanup().await;
}

#[tokio::test]
async fn failures_exclude_pending_and_older_runs() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;
    let since = base_time();

    for run in [
        finished_run(EventType::LeadCreated, Some(LeadId::new()), since, false),
        finished_run(EventType::DailySummary, None, since + Duration::hours(2), false),
        finished_run(EventType::LeadOverdue, None, since - Duration::hours(1), false),
        finished_run(EventType::LeadCreated, Some(LeadId::new()), since + Duration::hours(1), true),
        pending_run(EventType::LeadCreated, Some(LeadId::new()), since + Duration::hours(3)),
    ] {
        runs.create(&run).await.unwrap();
    }

    assert_eq!(runs.count_failures_since(since).await.unwrap(), 2);

    db.cleanup().await;
}

#[tokio::test]
async fn latest_run_can_be_restricted_to_successes() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;

    let good = finished_run(EventType::DailySummary, None, base_time(), true);
    let bad = finished_run(EventType::DailySummary, None, base_time() + Duration::days(1), false);
    runs.create(&good).await.unwrap();
    runs.create(&bad).await.unwrap();

    let latest = runs.find_latest(EventType::DailySummary, false).await.unwrap();
    assert_eq!(latest.map(|r| r.id), Some(bad.id));

    let latest_success = runs.find_latest(EventType::DailySummary, true).await.unwrap();
    assert_eq!(latest_success.map(|r| r.id), Some(good.id));

    assert!(runs.find_latest(EventType::LeadOverdue, false).await.unwrap().is_none());

    db.cleanup().await;
}

#[tokio::test]
async fn recent_runs_are_newest_first_and_limited() {
    let Some(db) = TestDatabase::create().await else { return };
    let runs = &db.storage.delivery_runs;

    let mut created = Vec::new();
    for hours in 0..5 {
        let run = finished_run(
            EventType::LeadCreated,
            Some(LeadId::new()),
            base_time() + Duration::hours(hours),
            true,
        );
        runs.create(&run).await.unwrap();
        created.push(run.id);
    }

    let recent = runs.find_recent(3).await.unwrap();
    let ids: Vec<_> = recent.iter().map(|r| r.id).collect();

    assert_eq!(ids, vec![created[4], created[3], created[2]]);

    db.cleanup().await;
}

#[tokio::test]
async fn audit_entries_are_appended_and_read_oldest_first() {
    let Some(db) = TestDatabase::create().await else { return };
    let audit = &db.storage.audit_events;
    let run_id = Uuid::new_v4().to_string();

    let later = AuditRecord::new(
        "automation.run",
        "delivery_run",
        run_id.clone(),
        "succeeded",
        json!({ "attempts": 2 }),
        base_time() + Duration::minutes(1),
    );
    let earlier = AuditRecord::new(
        "automation.run",
        "delivery_run",
        run_id.clone(),
        "created",
        json!({}),
        base_time(),
    );
    audit.append(later.clone()).await.unwrap();
    audit.append(earlier.clone()).await.unwrap();

    let records = audit.find_by_object("delivery_run", &run_id).await.unwrap();
    assert_eq!(records, vec![earlier, later]);

    assert!(audit.find_by_object("delivery_run", "unknown").await.unwrap().is_empty());

    db.cleanup().await;
}
