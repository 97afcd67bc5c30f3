//! Signed webhook delivery with bounded retries and a persistent run ledger.
//!
//! This crate is the delivery core behind the CRM automations. A trigger
//! hands it a lead or summary snapshot; it builds a canonical payload, signs
//! it, posts it with sequential retries and records every attempt in the
//! run ledger before returning the final run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌───────────────────┐   ┌─────────────┐
//! │ Payload │──▶│ Signer │──▶│ WebhookDispatcher │──▶│ HTTP Client │
//! └─────────┘   └────────┘   └───────────────────┘   └─────────────┘
//!                                │           │
//!                                ▼           ▼
//!                        ┌───────────┐ ┌────────────┐
//!                        │ RunLedger │ │ AuditSink  │
//!                        └───────────┘ └────────────┘
//!                              ▲
//!                     ┌────────────────┐
//!                     │ DuplicateGuard │
//!                     └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gdc_core::{LogAuditSink, RealClock, SummarySnapshot};
//! use gdc_delivery::{ledger::mock::MemoryRunLedger, DispatchConfig, WebhookDispatcher};
//!
//! # async fn example() -> gdc_delivery::Result<()> {
//! let config = DispatchConfig { secret: "s3cret".to_string(), ..DispatchConfig::default() };
//! let dispatcher = WebhookDispatcher::new(
//!     config,
//!     Arc::new(MemoryRunLedger::new()),
//!     Arc::new(LogAuditSink),
//!     Arc::new(RealClock::new()),
//! )?;
//!
//! let run = dispatcher.send_daily_summary(&SummarySnapshot::default()).await?;
//! println!("delivered: {} after {} attempts", run.success, run.attempts);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod payload;
pub mod retry;
pub mod signing;

pub use engine::{DeliveryTarget, DispatchConfig, WebhookDispatcher};
pub use error::{DeliveryError, Result};
pub use guard::DuplicateGuard;
pub use ledger::{PostgresRunLedger, RunLedger};
pub use payload::Payload;
pub use retry::RetryPolicy;

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-GDC-Event";

/// Header carrying the payload timestamp in Unix seconds.
pub const TIMESTAMP_HEADER: &str = "X-GDC-Timestamp";

/// Header carrying the `sha256=<hex>` signature.
pub const SIGNATURE_HEADER: &str = "X-GDC-Signature";

/// Default webhook base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5678/webhook/";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
