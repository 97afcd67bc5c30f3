//! Where the automations read CRM state from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use gdc_core::CrmSnapshot;

/// Read-only provider of the CRM state an automation run works on.
#[async_trait]
pub trait LeadSource: Send + Sync + std::fmt::Debug {
    /// Returns the current leads, interactions and stage changes.
    async fn snapshot(&self) -> Result<CrmSnapshot>;
}

/// Snapshot exported by the CRM as a JSON file.
///
/// Expected shape: `{ "leads": [...], "interactions": [...],
/// "stage_changes": [...] }`. Missing lists read as empty.
#[derive(Debug, Clone)]
pub struct JsonLeadSource {
    path: PathBuf,
}

impl JsonLeadSource {
    /// Creates a source reading `path` on every call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path the snapshot is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LeadSource for JsonLeadSource {
    async fn snapshot(&self) -> Result<CrmSnapshot> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read CRM snapshot {}", self.path.display()))?;

        let snapshot: CrmSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid CRM snapshot {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            leads = snapshot.leads.len(),
            interactions = snapshot.interactions.len(),
            stage_changes = snapshot.stage_changes.len(),
            "loaded CRM snapshot"
        );

        Ok(snapshot)
    }
}
