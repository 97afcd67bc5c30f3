//! In-memory audit sink.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use gdc_core::{error::CoreError, AuditRecord, AuditSink, Result};
use tokio::sync::Mutex;

/// Audit sink that keeps records for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended so far, in order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Makes subsequent appends fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(CoreError::Database("audit sink unavailable".to_string()));
        }

        self.records.lock().await.push(record);
        Ok(())
    }
}
