//! Trigger layer for the GDC CRM automations.
//!
//! Loads [`Config`], reads CRM state through a [`LeadSource`], and decides
//! which webhooks to send: `lead.created` when the caller commits a lead,
//! `lead.overdue` once per lead per day, and `daily.summary` once per day.
//! Delivery itself is delegated to [`gdc_delivery::WebhookDispatcher`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod health;
pub mod leads;
pub mod service;

pub use config::Config;
pub use health::AutomationHealth;
pub use leads::{JsonLeadSource, LeadSource};
pub use service::{
    AutomationService, AutomationSettings, DailySummaryOutcome, OverdueReport, RunReport,
    RunSelection,
};
