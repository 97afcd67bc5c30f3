//! Delivery engine: one run, sequential attempts, full history.
//!
//! A call to [`WebhookDispatcher::deliver`] owns its `DeliveryRun` for the
//! whole attempt loop:
//!
//! 1. the run is created in the ledger before any network I/O;
//! 2. each attempt bumps `attempts` and `last_attempt_at` first, then
//!    signs, posts and records the outcome;
//! 3. the run is saved after every attempt, whatever happened;
//! 4. the loop stops on the first 2xx, on a missing secret, or when the
//!    retry budget is spent;
//! 5. one audit record summarizes the run.
//!
//! Attempt failures end up in the returned run, not in `Err`. Only
//! problems that prevent a run from existing at all (unknown event type,
//! zero retry budget, ledger refusing the insert) are returned as errors.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use gdc_core::{
    AuditRecord, AuditSink, Clock, CorrelationId, DeliveryRun, EventType, LeadSnapshot,
    SummarySnapshot,
};
use serde_json::json;
use sqlx::types::Json;
use tracing::{debug, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient, WebhookRequest, WebhookResponse},
    error::{DeliveryError, ErrorCategory, Result},
    ledger::RunLedger,
    payload::Payload,
    retry::{RetryDecision, RetryPolicy},
    signing, EVENT_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};

/// Audit `event_type` written once per run.
pub const AUDIT_EVENT_TYPE: &str = "automation.run";

/// Audit `model_name` for run records.
pub const AUDIT_MODEL_NAME: &str = "DeliveryRun";

/// Where and how one event type is delivered.
#[derive(Clone)]
pub struct DeliveryTarget {
    /// Full destination URL.
    pub url: String,
    /// Signing secret. Empty means delivery is misconfigured.
    pub secret: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempt budget and backoff.
    pub retry_policy: RetryPolicy,
}

impl fmt::Debug for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTarget")
            .field("url", &self.url)
            .field("secret", &mask(&self.secret))
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// Dispatcher-wide delivery settings.
#[derive(Clone)]
pub struct DispatchConfig {
    /// Base URL the per-event path suffix is appended to.
    pub base_url: String,
    /// Shared signing secret.
    pub secret: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempt budget and backoff.
    pub retry_policy: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            secret: String::new(),
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("base_url", &self.base_url)
            .field("secret", &mask(&self.secret))
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl DispatchConfig {
    /// Destination URL for an event type.
    ///
    /// Trailing slashes on the base are normalized to exactly one.
    pub fn target_url(&self, event_type: EventType) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), event_type.path_suffix())
    }

    /// Full delivery target for an event type.
    pub fn target(&self, event_type: EventType) -> DeliveryTarget {
        DeliveryTarget {
            url: self.target_url(event_type),
            secret: self.secret.clone(),
            timeout: self.timeout,
            retry_policy: self.retry_policy.clone(),
        }
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Builds payloads and delivers them with bounded retries.
pub struct WebhookDispatcher {
    config: DispatchConfig,
    client: DeliveryClient,
    ledger: Arc<dyn RunLedger>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(
        config: DispatchConfig,
        ledger: Arc<dyn RunLedger>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client_config = ClientConfig { timeout: config.timeout, ..ClientConfig::default() };
        let client = DeliveryClient::new(client_config)?;

        Ok(Self::with_client(config, client, ledger, audit, clock))
    }

    /// Creates a dispatcher around an existing HTTP client.
    pub fn with_client(
        config: DispatchConfig,
        client: DeliveryClient,
        ledger: Arc<dyn RunLedger>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config, client, ledger, audit, clock }
    }

    /// Dispatcher settings.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Ledger runs are written to.
    pub fn ledger(&self) -> Arc<dyn RunLedger> {
        self.ledger.clone()
    }

    /// Clock used for timestamps and backoff.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Builds a payload with a fresh correlation id stamped with the clock.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InternalError` if encoding fails.
    pub fn build_payload(
        &self,
        event_type: EventType,
        lead: Option<&LeadSnapshot>,
        summary: Option<&SummarySnapshot>,
    ) -> Result<Payload> {
        Payload::build(event_type, CorrelationId::new(), self.clock.now_utc(), lead, summary)
    }

    /// Builds and delivers an event to its configured target.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver`].
    pub async fn dispatch(
        &self,
        event_type: EventType,
        lead: Option<&LeadSnapshot>,
        summary: Option<&SummarySnapshot>,
    ) -> Result<DeliveryRun> {
        let payload = self.build_payload(event_type, lead, summary)?;
        self.deliver(&payload, &self.config.target(event_type)).await
    }

    /// Like [`Self::dispatch`], for an event type given by name.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidEventType` for an unknown name, before
    /// any payload is built or run recorded.
    pub async fn dispatch_named(
        &self,
        event_type: &str,
        lead: Option<&LeadSnapshot>,
        summary: Option<&SummarySnapshot>,
    ) -> Result<DeliveryRun> {
        let event_type: EventType = event_type.parse()?;
        self.dispatch(event_type, lead, summary).await
    }

    /// Announces a newly created lead.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver`].
    pub async fn notify_lead_created(&self, lead: &LeadSnapshot) -> Result<DeliveryRun> {
        self.dispatch(EventType::LeadCreated, Some(lead), None).await
    }

    /// Announces a lead whose next action is overdue.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver`].
    pub async fn notify_lead_overdue(&self, lead: &LeadSnapshot) -> Result<DeliveryRun> {
        self.dispatch(EventType::LeadOverdue, Some(lead), None).await
    }

    /// Sends the daily digest.
    ///
    /// # Errors
    ///
    /// See [`Self::deliver`].
    pub async fn send_daily_summary(&self, summary: &SummarySnapshot) -> Result<DeliveryRun> {
        self.dispatch(EventType::DailySummary, None, Some(summary)).await
    }

    /// Runs the attempt loop for one payload.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` if the retry budget is zero
    /// - `StorageError` if the ledger refuses to create the run
    ///
    /// Every other failure is recorded in the returned run.
    pub async fn deliver(&self, payload: &Payload, target: &DeliveryTarget) -> Result<DeliveryRun> {
        let max_attempts = target.retry_policy.max_attempts;
        if max_attempts == 0 {
            return Err(DeliveryError::configuration(
                "retry budget must allow at least one attempt",
            ));
        }

        let mut run = DeliveryRun::pending(
            payload.correlation_id(),
            payload.event_type(),
            payload.subject_id(),
            target.url.clone(),
            payload.hash(),
            payload.value().clone(),
            self.clock.now_utc(),
        );
        self.ledger.create(run.clone()).await?;

        info!(
            run_id = %run.id,
            correlation_id = %run.correlation_id,
            event_type = %run.event_type,
            target_url = %run.target_url,
            payload_hash = %run.payload_hash,
            "delivery run created"
        );

        for attempt in 1..=max_attempts {
            let started = self.clock.now();
            run.attempts = i32::try_from(attempt).unwrap_or(i32::MAX);
            run.last_attempt_at = Some(self.clock.now_utc());

            let mut headers = base_headers(payload);
            let failure = match signing::sign(payload.as_bytes(), &target.secret) {
                Ok(signature) => {
                    headers.insert(SIGNATURE_HEADER.to_string(), signature);
                    let request = WebhookRequest {
                        correlation_id: run.correlation_id,
                        event_type: run.event_type,
                        url: target.url.clone(),
                        headers: headers.clone(),
                        body: Bytes::copy_from_slice(payload.as_bytes()),
                        timeout: target.timeout,
                        attempt,
                    };

                    match self.client.deliver(request).await {
                        Ok(response) => record_response(&mut run, &response),
                        Err(error) => {
                            record_failure(&mut run, &error);
                            Some(error)
                        },
                    }
                },
                Err(error) => {
                    let error = DeliveryError::configuration(error.to_string());
                    record_failure(&mut run, &error);
                    Some(error)
                },
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            run.duration_ms = Some(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
            run.request_headers = Json(headers);
            self.persist(&run).await;

            let Some(error) = failure else {
                info!(
                    run_id = %run.id,
                    attempt,
                    status_code = run.status_code,
                    duration_ms = run.duration_ms,
                    "delivery succeeded"
                );
                break;
            };

            warn!(
                run_id = %run.id,
                attempt,
                max_attempts,
                category = %ErrorCategory::from(&error),
                status_code = run.status_code,
                "delivery attempt failed: {}",
                error
            );

            match target.retry_policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => {
                    debug!(run_id = %run.id, delay_ms = delay.as_millis(), "retrying delivery");
                    if !delay.is_zero() {
                        self.clock.sleep(delay).await;
                    }
                },
                RetryDecision::GiveUp { reason } => {
                    warn!(
                        run_id = %run.id,
                        attempts = run.attempts,
                        "delivery abandoned: {}",
                        reason
                    );
                    break;
                },
            }
        }

        self.audit_run(&run).await;

        Ok(run)
    }

    /// Saves the run; a failed save is logged and the loop carries on.
    async fn persist(&self, run: &DeliveryRun) {
        if let Err(e) = self.ledger.save(run.clone()).await {
            warn!(
                run_id = %run.id,
                attempts = run.attempts,
                "failed to persist delivery run: {}",
                e
            );
        }
    }

    async fn audit_run(&self, run: &DeliveryRun) {
        let record = AuditRecord::new(
            AUDIT_EVENT_TYPE,
            AUDIT_MODEL_NAME,
            run.id.to_string(),
            "create",
            json!({
                "correlation_id": run.correlation_id.to_string(),
                "event_type": run.event_type.as_str(),
                "subject_id": run.subject_id.map(|id| id.to_string()),
                "success": run.success,
                "attempts": run.attempts,
            }),
            self.clock.now_utc(),
        );

        if let Err(e) = self.audit.append(record).await {
            warn!(run_id = %run.id, "failed to append audit record: {}", e);
        }
    }
}

fn base_headers(payload: &Payload) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        (EVENT_HEADER.to_string(), payload.event_type().as_str().to_string()),
        (TIMESTAMP_HEADER.to_string(), payload.timestamp().to_string()),
    ])
}

/// Copies an HTTP answer into the run. Returns the failure for a non-2xx.
fn record_response(run: &mut DeliveryRun, response: &WebhookResponse) -> Option<DeliveryError> {
    run.status_code = Some(i32::from(response.status_code));
    run.response_snippet = Some(response.body_snippet.clone());
    run.success = response.is_success;

    if response.is_success {
        run.error_message = None;
        None
    } else {
        let error = DeliveryError::remote_rejection(response.status_code);
        run.error_message = Some(error.to_string());
        Some(error)
    }
}

fn record_failure(run: &mut DeliveryRun, error: &DeliveryError) {
    run.status_code = None;
    run.response_snippet = None;
    run.success = false;
    run.error_message = Some(error.to_string());
}
