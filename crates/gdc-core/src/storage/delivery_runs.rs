//! Repository for delivery run rows.
//!
//! A run row is inserted once, before the first network call, and then
//! overwritten in full after every attempt. Besides the ledger itself, the
//! table answers the duplicate-suppression and dashboard queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{CorrelationId, DeliveryRun, EventType, LeadId, RunId},
};

const COLUMNS: &str = "id, correlation_id, event_type, subject_id, target_url, payload_hash, \
                       attempts, status_code, success, error_message, response_snippet, \
                       duration_ms, last_attempt_at, request_headers, payload_preview, created_at";

/// Repository for delivery run database operations.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new run.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConstraintViolation` if the id already exists, or
    /// `CoreError::Database` if the insert fails.
    pub async fn create(&self, run: &DeliveryRun) -> Result<RunId> {
        let id: RunId = sqlx::query_scalar(
            r"
            INSERT INTO delivery_runs (
                id, correlation_id, event_type, subject_id, target_url, payload_hash,
                attempts, status_code, success, error_message, response_snippet,
                duration_ms, last_attempt_at, request_headers, payload_preview, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
            )
            RETURNING id
            ",
        )
        .bind(run.id)
        .bind(run.correlation_id)
        .bind(run.event_type)
        .bind(run.subject_id)
        .bind(&run.target_url)
        .bind(&run.payload_hash)
        .bind(run.attempts)
        .bind(run.status_code)
        .bind(run.success)
        .bind(&run.error_message)
        .bind(&run.response_snippet)
        .bind(run.duration_ms)
        .bind(run.last_attempt_at)
        .bind(&run.request_headers)
        .bind(&run.payload_preview)
        .bind(run.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Overwrites the mutable attempt fields of an existing run.
    ///
    /// Identity columns (`correlation_id`, `event_type`, `subject_id`,
    /// `target_url`, `payload_hash`, `payload_preview`, `created_at`) are
    /// never rewritten.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if no row has the run's id.
    pub async fn save(&self, run: &DeliveryRun) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE delivery_runs
            SET attempts = $2,
                status_code = $3,
                success = $4,
                error_message = $5,
                response_snippet = $6,
                duration_ms = $7,
                last_attempt_at = $8,
                request_headers = $9
            WHERE id = $1
            ",
        )
        .bind(run.id)
        .bind(run.attempts)
        .bind(run.status_code)
        .bind(run.success)
        .bind(&run.error_message)
        .bind(&run.response_snippet)
        .bind(run.duration_ms)
        .bind(run.last_attempt_at)
        .bind(&run.request_headers)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("delivery run {}", run.id)));
        }

        Ok(())
    }

    /// Finds a run by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: RunId) -> Result<Option<DeliveryRun>> {
        let run = sqlx::query_as::<_, DeliveryRun>(&format!(
            "SELECT {COLUMNS} FROM delivery_runs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(run)
    }

    /// Finds the run carrying a correlation id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_correlation_id(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<DeliveryRun>> {
        let run = sqlx::query_as::<_, DeliveryRun>(&format!(
            "SELECT {COLUMNS} FROM delivery_runs WHERE correlation_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(correlation_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(run)
    }

    /// Whether a successful run exists for the event in `[start, end)`.
    ///
    /// With `subject` set, only runs about that lead match. With `None`, any
    /// subject matches, including none.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn exists_success_between(
        &self,
        event_type: EventType,
        subject: Option<LeadId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM delivery_runs
                WHERE event_type = $1
                  AND success
                  AND created_at >= $2
                  AND created_at < $3
                  AND ($4::uuid IS NULL OR subject_id = $4)
            )
            ",
        )
        .bind(event_type)
        .bind(start)
        .bind(end)
        .bind(subject)
        .fetch_one(&*self.pool)
        .await?;

        Ok(exists.0)
    }

    /// Counts failed runs created at or after `since`.
    ///
    /// Runs still pending (zero attempts) are not failures.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM delivery_runs
            WHERE NOT success AND attempts > 0 AND created_at >= $1
            ",
        )
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
    }

    /// Most recent run of an event type, optionally restricted to successes.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_latest(
        &self,
        event_type: EventType,
        success_only: bool,
    ) -> Result<Option<DeliveryRun>> {
        let run = sqlx::query_as::<_, DeliveryRun>(&format!(
            "SELECT {COLUMNS} FROM delivery_runs \
             WHERE event_type = $1 AND (success OR NOT $2) \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(event_type)
        .bind(success_only)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(run)
    }

    /// Most recent runs across all event types, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_recent(&self, limit: i64) -> Result<Vec<DeliveryRun>> {
        let runs = sqlx::query_as::<_, DeliveryRun>(&format!(
            "SELECT {COLUMNS} FROM delivery_runs ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(runs)
    }
}
