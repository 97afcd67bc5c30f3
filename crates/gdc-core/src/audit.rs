//! Append-only audit trail.
//!
//! The sink interface exposes a single `append` operation. Records cannot
//! be updated or deleted through it; that guarantee is carried by the type
//! signature rather than checked at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::Result;

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    /// Unique identifier of the entry.
    pub id: Uuid,

    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,

    /// Kind of event being audited (e.g. `automation.run`).
    pub event_type: String,

    /// Name of the audited model.
    pub model_name: String,

    /// Identifier of the audited object.
    pub object_id: String,

    /// What happened to the object.
    pub action: String,

    /// Structured context.
    pub metadata: Json<serde_json::Value>,
}

impl AuditRecord {
    /// Creates a new entry with a fresh identifier.
    pub fn new(
        event_type: impl Into<String>,
        model_name: impl Into<String>,
        object_id: impl Into<String>,
        action: impl Into<String>,
        metadata: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at,
            event_type: event_type.into(),
            model_name: model_name.into(),
            object_id: object_id.into(),
            action: action.into(),
            metadata: Json(metadata),
        }
    }
}

/// Write-only destination for audit records.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Appends a record to the trail.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// Sink that forwards each record to several sinks.
///
/// A failing sink does not stop the others; the first error is returned
/// once every sink has been tried.
#[derive(Debug, Default)]
pub struct MulticastAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl MulticastAuditSink {
    /// Creates a multicast sink with no subscribers.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Adds a sink to receive records.
    pub fn add_sink(&mut self, sink: std::sync::Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

#[async_trait::async_trait]
impl AuditSink for MulticastAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let appends = self.sinks.iter().map(|sink| sink.append(record.clone()));
        futures::future::join_all(appends).await.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}

/// Sink that writes each record as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

#[async_trait::async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        tracing::info!(
            audit_id = %record.id,
            event_type = %record.event_type,
            model_name = %record.model_name,
            object_id = %record.object_id,
            action = %record.action,
            metadata = %record.metadata.0,
            "audit record appended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::json;

    use super::*;
    use crate::error::CoreError;

    #[derive(Debug, Default)]
    struct CountingSink {
        appended: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl AuditSink for CountingSink {
        async fn append(&self, _record: AuditRecord) -> Result<()> {
            self.appended.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::Database("sink offline".to_string()));
            }
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::new(
            "automation.run",
            "DeliveryRun",
            "run-1",
            "create",
            json!({"success": true}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn multicast_forwards_to_every_sink() {
        let first = Arc::new(CountingSink::default());
        let second = Arc::new(CountingSink::default());
        let mut multicast = MulticastAuditSink::new();
        multicast.add_sink(first.clone());
        multicast.add_sink(second.clone());

        multicast.append(record()).await.unwrap();

        assert_eq!(multicast.sink_count(), 2);
        assert_eq!(first.appended.load(Ordering::SeqCst), 1);
        assert_eq!(second.appended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multicast_reports_failure_after_trying_all_sinks() {
        let failing = Arc::new(CountingSink { fail: true, ..Default::default() });
        let healthy = Arc::new(CountingSink::default());
        let mut multicast = MulticastAuditSink::new();
        multicast.add_sink(failing.clone());
        multicast.add_sink(healthy.clone());

        assert!(multicast.append(record()).await.is_err());
        assert_eq!(healthy.appended.load(Ordering::SeqCst), 1);
    }
}
