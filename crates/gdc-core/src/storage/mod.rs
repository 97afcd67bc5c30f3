//! Database access layer for the run ledger and the audit trail.
//!
//! Repositories translate between domain models and table rows. Queries are
//! built at runtime, so the crate compiles without a live database; the
//! schema ships as embedded migrations.

use std::sync::Arc;

use sqlx::PgPool;

pub mod audit_events;
pub mod delivery_runs;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for delivery run rows.
    pub delivery_runs: Arc<delivery_runs::Repository>,

    /// Append-only repository for audit entries.
    pub audit_events: Arc<audit_events::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            delivery_runs: Arc::new(delivery_runs::Repository::new(pool.clone())),
            audit_events: Arc::new(audit_events::Repository::new(pool)),
        }
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if a migration fails to apply.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&*self.delivery_runs.pool()).await?;
        tracing::info!("database migrations applied");

        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.delivery_runs.pool()).await?;

        Ok(())
    }
}
