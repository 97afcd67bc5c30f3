//! Append-only repository for audit entries.
//!
//! Exposes inserts and reads only. The `AuditSink` implementation is what the
//! delivery engine sees, so nothing downstream can rewrite history.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    audit::{AuditRecord, AuditSink},
    error::Result,
};

/// Repository for audit event rows.
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

    /// Inserts one entry.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_events (
                id, recorded_at, event_type, model_name, object_id, action, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(record.id)
        .bind(record.recorded_at)
        .bind(&record.event_type)
        .bind(&record.model_name)
        .bind(&record.object_id)
        .bind(&record.action)
        .bind(&record.metadata)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Entries about one object, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_object(
        &self,
        model_name: &str,
        object_id: &str,
    ) -> Result<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            r"
            SELECT id, recorded_at, event_type, model_name, object_id, action, metadata
            FROM audit_events
            WHERE model_name = $1 AND object_id = $2
            ORDER BY recorded_at ASC
            ",
        )
        .bind(model_name)
        .bind(object_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for Repository {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.insert(&record).await
    }
}
