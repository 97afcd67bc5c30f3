//! Core domain models and pure lead computations.
//!
//! Provides strongly-typed identifiers, the closed set of automation event
//! types, the delivery run record, read-only CRM snapshots, priority ranking,
//! daily-summary and consistency-metric computation, and the PostgreSQL
//! repositories behind the run ledger and the audit trail. The delivery and
//! trigger crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod error;
pub mod metrics;
pub mod models;
pub mod priority;
pub mod storage;
pub mod summary;
pub mod time;

pub use audit::{AuditRecord, AuditSink, LogAuditSink, MulticastAuditSink};
pub use error::{CoreError, Result};
pub use models::{
    CorrelationId, CrmSnapshot, DeliveryRun, EventType, InteractionSnapshot, LeadId, LeadSnapshot,
    RunId, RunStatus, StageChange,
};
pub use metrics::{ConsistencyMetrics, FollowUpRate, Window, WindowedMetric};
pub use priority::{prioritize, rank, PriorityPolicy, PriorityRank, RankedLead};
pub use storage::Storage;
pub use summary::{build_daily_summary, PrioritySubject, SummaryCounts, SummarySnapshot};
pub use time::{Clock, RealClock, TestClock};
