//! Run ledger abstraction for the delivery engine.
//!
//! The engine only needs to create a run, overwrite its state after each
//! attempt and answer a handful of read-only queries. Production uses the
//! PostgreSQL repository from `gdc_core::storage`; tests use the in-memory
//! ledger in [`mock`].

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use gdc_core::{error::Result, storage::Storage, DeliveryRun, EventType, LeadId};

/// Boxed future returned by ledger operations.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistent store for delivery runs.
pub trait RunLedger: Send + Sync + 'static {
    /// Inserts a new run in its pending state.
    fn create(&self, run: DeliveryRun) -> LedgerFuture<'_, ()>;

    /// Replaces the stored state of an existing run.
    fn save(&self, run: DeliveryRun) -> LedgerFuture<'_, ()>;

    /// Whether a successful run of `event_type` was created in
    /// `[start, end)`, optionally about one lead.
    fn exists_success_between(
        &self,
        event_type: EventType,
        subject: Option<LeadId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerFuture<'_, bool>;

    /// Failed runs created at or after `since`.
    fn count_failures_since(&self, since: DateTime<Utc>) -> LedgerFuture<'_, i64>;

    /// Most recent run of an event type.
    fn find_latest(
        &self,
        event_type: EventType,
        success_only: bool,
    ) -> LedgerFuture<'_, Option<DeliveryRun>>;

    /// Most recent runs, newest first.
    fn find_recent(&self, limit: usize) -> LedgerFuture<'_, Vec<DeliveryRun>>;
}

/// Ledger backed by the PostgreSQL `delivery_runs` table.
pub struct PostgresRunLedger {
    storage: Arc<Storage>,
}

impl PostgresRunLedger {
    /// Creates a new PostgreSQL ledger adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl RunLedger for PostgresRunLedger {
    fn create(&self, run: DeliveryRun) -> LedgerFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_runs.create(&run).await.map(|_| ()) })
    }

    fn save(&self, run: DeliveryRun) -> LedgerFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_runs.save(&run).await })
    }

    fn exists_success_between(
        &self,
        event_type: EventType,
        subject: Option<LeadId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerFuture<'_, bool> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.delivery_runs.exists_success_between(event_type, subject, start, end).await
        })
    }

    fn count_failures_since(&self, since: DateTime<Utc>) -> LedgerFuture<'_, i64> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_runs.count_failures_since(since).await })
    }

    fn find_latest(
        &self,
        event_type: EventType,
        success_only: bool,
    ) -> LedgerFuture<'_, Option<DeliveryRun>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_runs.find_latest(event_type, success_only).await })
    }

    fn find_recent(&self, limit: usize) -> LedgerFuture<'_, Vec<DeliveryRun>> {
        let storage = self.storage.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Box::pin(async move { storage.delivery_runs.find_recent(limit).await })
    }
}

pub mod mock {
    //! In-memory ledger for tests.
    //!
    //! Keeps every saved state in order, so tests can check that progress
    //! was persisted after each attempt, and can be told to fail writes.

    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use chrono::{DateTime, Utc};
    use gdc_core::{error::CoreError, DeliveryRun, EventType, LeadId, RunId};
    use tokio::sync::RwLock;

    use super::{LedgerFuture, RunLedger};

    /// Ledger holding runs in memory.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryRunLedger {
        runs: Arc<RwLock<HashMap<RunId, DeliveryRun>>>,
        history: Arc<RwLock<Vec<DeliveryRun>>>,
        fail_creates: Arc<AtomicBool>,
        fail_saves: Arc<AtomicBool>,
    }

    impl MemoryRunLedger {
        /// Creates an empty ledger.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a run directly, bypassing the history.
        pub async fn insert(&self, run: DeliveryRun) {
            self.runs.write().await.insert(run.id, run);
        }

        /// All stored runs, oldest first.
        pub async fn runs(&self) -> Vec<DeliveryRun> {
            let mut runs: Vec<DeliveryRun> = self.runs.read().await.values().cloned().collect();
            runs.sort_by_key(|run| run.created_at);
            runs
        }

        /// Current state of one run.
        pub async fn get(&self, id: RunId) -> Option<DeliveryRun> {
            self.runs.read().await.get(&id).cloned()
        }

        /// Every state written through `create` and `save`, in write order.
        pub async fn history(&self) -> Vec<DeliveryRun> {
            self.history.read().await.clone()
        }

        /// Makes subsequent `create` calls fail.
        pub fn fail_creates(&self, fail: bool) {
            self.fail_creates.store(fail, Ordering::Release);
        }

        /// Makes subsequent `save` calls fail.
        pub fn fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::Release);
        }
    }

    impl RunLedger for MemoryRunLedger {
        fn create(&self, run: DeliveryRun) -> LedgerFuture<'_, ()> {
            Box::pin(async move {
                if self.fail_creates.load(Ordering::Acquire) {
                    return Err(CoreError::Database("ledger unavailable".to_string()));
                }

                let mut runs = self.runs.write().await;
                if runs.contains_key(&run.id) {
                    return Err(CoreError::ConstraintViolation(format!("run {} exists", run.id)));
                }
                runs.insert(run.id, run.clone());
                self.history.write().await.push(run);
                Ok(())
            })
        }

        fn save(&self, run: DeliveryRun) -> LedgerFuture<'_, ()> {
            Box::pin(async move {
                if self.fail_saves.load(Ordering::Acquire) {
                    return Err(CoreError::Database("ledger unavailable".to_string()));
                }

                let mut runs = self.runs.write().await;
                let Some(stored) = runs.get_mut(&run.id) else {
                    return Err(CoreError::NotFound(format!("delivery run {}", run.id)));
                };
                *stored = run.clone();
                self.history.write().await.push(run);
                Ok(())
            })
        }

        fn exists_success_between(
            &self,
            event_type: EventType,
            subject: Option<LeadId>,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> LedgerFuture<'_, bool> {
            Box::pin(async move {
                Ok(self.runs.read().await.values().any(|run| {
                    run.event_type == event_type
                        && run.success
                        && start <= run.created_at
                        && run.created_at < end
                        && subject.map_or(true, |subject| run.subject_id == Some(subject))
                }))
            })
        }

        fn count_failures_since(&self, since: DateTime<Utc>) -> LedgerFuture<'_, i64> {
            Box::pin(async move {
                let count = self
                    .runs
                    .read()
                    .await
                    .values()
                    .filter(|run| !run.success && run.attempts > 0 && run.created_at >= since)
                    .count();
                Ok(i64::try_from(count).unwrap_or(i64::MAX))
            })
        }

        fn find_latest(
            &self,
            event_type: EventType,
            success_only: bool,
        ) -> LedgerFuture<'_, Option<DeliveryRun>> {
            Box::pin(async move {
                Ok(self
                    .runs
                    .read()
                    .await
                    .values()
                    .filter(|run| run.event_type == event_type && (run.success || !success_only))
                    .max_by_key(|run| run.created_at)
                    .cloned())
            })
        }

        fn find_recent(&self, limit: usize) -> LedgerFuture<'_, Vec<DeliveryRun>> {
            Box::pin(async move {
                let mut runs: Vec<DeliveryRun> = self.runs.read().await.values().cloned().collect();
                runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                runs.truncate(limit);
                Ok(runs)
            })
        }
    }
}
