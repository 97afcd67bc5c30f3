//! Scriptable webhook endpoint on top of `wiremock`.

use std::time::Duration;

use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

/// A local HTTP server standing in for the automation webhook receiver.
pub struct WebhookEndpoint {
    server: MockServer,
}

impl WebhookEndpoint {
    /// Starts a server with no responses mounted.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL to configure as the webhook base; ends with `/webhook/`.
    pub fn base_url(&self) -> String {
        format!("{}/webhook/", self.server.uri())
    }

    /// Underlying mock server, for custom matchers.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answers every POST with `status`.
    pub async fn always(&self, status: u16) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body_for(status)))
            .mount(&self.server)
            .await;
    }

    /// Answers every POST with `status`, but only after `delay`.
    pub async fn delayed(&self, status: u16, delay: Duration) {
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(status).set_body_string(body_for(status)).set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answers POSTs with `statuses` in order; the last one repeats forever.
    pub async fn sequence(&self, statuses: &[u16]) {
        let Some((last, head)) = statuses.split_last() else {
            return;
        };

        for status in head {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(*status).set_body_string(body_for(*status)))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
        self.always(*last).await;
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on the path ending with `suffix`.
    pub async fn requests_to(&self, suffix: &str) -> Vec<wiremock::Request> {
        self.requests().await.into_iter().filter(|r| r.url.path().ends_with(suffix)).collect()
    }
}

fn body_for(status: u16) -> String {
    if (200..300).contains(&status) {
        "OK".to_string()
    } else {
        format!("status {status}")
    }
}
