//! HTTP client for webhook delivery.
//!
//! Posts one attempt and reports what came back. Any HTTP answer, 2xx or
//! not, is a response; only failures to get an answer (connect errors,
//! timeouts) are errors.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use gdc_core::{CorrelationId, EventType};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Maximum number of characters kept from a response body.
pub const RESPONSE_SNIPPET_CHARS: usize = 1000;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout used when a request does not carry its own.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: "GDC-Automations/1.0".to_string(),
        }
    }
}

/// HTTP client for webhook delivery, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One outbound attempt.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Run the attempt belongs to.
    pub correlation_id: CorrelationId,
    /// Event being delivered.
    pub event_type: EventType,
    /// Destination URL.
    pub url: String,
    /// Headers to send, including `Content-Type`.
    pub headers: BTreeMap<String, String>,
    /// Canonical payload bytes.
    pub body: Bytes,
    /// Per-request timeout.
    pub timeout: Duration,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What the endpoint answered.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// First characters of the response body.
    pub body_snippet: String,
    /// Time from send to full body read.
    pub duration: Duration,
    /// Whether the status is 2xx.
    pub is_success: bool,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Posts one attempt.
    ///
    /// # Errors
    ///
    /// - `Timeout` when no answer arrives within the request timeout
    /// - `TransportError` for connection and other request failures
    pub async fn deliver(&self, request: WebhookRequest) -> Result<WebhookResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_delivery",
            correlation_id = %request.correlation_id,
            event_type = %request.event_type,
            url = %request.url,
            attempt = request.attempt
        );

        async move {
            tracing::debug!("sending webhook");

            let mut http_request =
                self.client.post(&request.url).timeout(request.timeout).body(request.body.clone());
            for (key, value) in &request.headers {
                http_request = http_request.header(key, value);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(request.timeout));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::transport(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::transport(e.to_string()));
                },
            };

            let status_code = response.status().as_u16();
            let is_success = response.status().is_success();

            let body_snippet = match response.bytes().await {
                Ok(bytes) => snippet(&bytes),
                Err(e) => {
                    tracing::warn!("failed to read response body: {}", e);
                    String::new()
                },
            };
            let duration = start_time.elapsed();

            if is_success {
                tracing::info!(
                    status = status_code,
                    duration_ms = duration.as_millis(),
                    "webhook accepted"
                );
            } else {
                tracing::warn!(
                    status = status_code,
                    duration_ms = duration.as_millis(),
                    "webhook rejected"
                );
            }

            Ok(WebhookResponse { status_code, body_snippet, duration, is_success })
        }
        .instrument(span)
        .await
    }
}

/// Lossy UTF-8 decode, truncated to [`RESPONSE_SNIPPET_CHARS`] characters.
fn snippet(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(RESPONSE_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_by_characters() {
        let body = "é".repeat(RESPONSE_SNIPPET_CHARS + 10);
        let cut = snippet(body.as_bytes());

        assert_eq!(cut.chars().count(), RESPONSE_SNIPPET_CHARS);
    }

    #[test]
    fn snippet_keeps_short_bodies() {
        assert_eq!(snippet(b"ok"), "ok");
        assert_eq!(snippet(&[0xff, b'a']), "\u{fffd}a");
    }

    #[test]
    fn default_config_uses_crate_timeout() {
        let client = DeliveryClient::with_defaults().unwrap();
        assert_eq!(client.config().timeout, Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS));
    }
}
