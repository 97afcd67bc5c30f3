//! Test infrastructure shared by the GDC crates.
//!
//! Lead fixtures with deterministic defaults, a wiremock-backed webhook
//! endpoint that can script status sequences, and an in-memory audit sink.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audit;
pub mod fixtures;
pub mod http;

pub use audit::MemoryAuditSink;
pub use fixtures::{fixed_now, LeadBuilder, SnapshotBuilder};
pub use gdc_core::{Clock, TestClock};
pub use http::WebhookEndpoint;
