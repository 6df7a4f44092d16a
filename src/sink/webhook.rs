use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{deliver, report_failure, Sink, SinkKind};
use crate::config::WebhookConfig;
use crate::event::CanonicalEvent;
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Environment fallback for the webhook URL
pub const WEBHOOK_URL_ENV: &str = "KW_WEBHOOK_URL";

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts `{"text": message}` for every event
pub struct WebhookSink {
    url: String,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl WebhookSink {
    /// Create the sink; the URL is resolved in `init`
    pub fn new(config: &WebhookConfig, http: reqwest::Client, retry: RetryConfig) -> Self {
        Self {
            url: config.url.clone(),
            http,
            retry,
        }
    }

    async fn notify(&self, event: &CanonicalEvent) {
        let body = WebhookMessage {
            text: &event.message,
        };
        let result = deliver(&self.retry, SinkKind::Webhook, "post webhook", || {
            self.http.post(&self.url).json(&body)
        })
        .await;

        match result {
            Ok(_) => debug!(url = %self.url, name = %event.name, "Webhook delivered"),
            Err(e) => report_failure(SinkKind::Webhook, event, &e),
        }
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    async fn init(&mut self) -> Result<()> {
        if self.url.is_empty() {
            self.url = std::env::var(WEBHOOK_URL_ENV).unwrap_or_default();
        }
        if self.url.is_empty() {
            return Err(Error::sink(
                "webhook",
                format!("missing webhook url: set handlers.webhook.url or {WEBHOOK_URL_ENV}"),
            ));
        }
        Ok(())
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.notify(event).await;
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.notify(event).await;
    }

    async fn on_deleted(&self, event: &CanonicalEvent) {
        self.notify(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(url: &str, attempts: u32) -> WebhookSink {
        WebhookSink::new(
            &WebhookConfig {
                enable: true,
                url: url.to_string(),
            },
            reqwest::Client::new(),
            RetryConfig::with_max_attempts(attempts).initial_delay(Duration::from_millis(1)),
        )
    }

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            kind: "pods".to_string(),
            name: "web-1".to_string(),
            message: "pods:web-1 in namespace default has been CREATED".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn posts_message_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "text": "pods:web-1 in namespace default has been CREATED"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let mut s = sink(&format!("{}/hook", server.uri()), 1);
        s.init().await.unwrap();
        s.on_created(&event()).await;
        s.on_updated(&event()).await;
        s.on_deleted(&event()).await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let s = sink(&format!("{}/hook", server.uri()), 5);
        s.on_created(&event()).await;
    }

    #[tokio::test]
    async fn rate_limited_responses_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let s = sink(&format!("{}/hook", server.uri()), 3);
        s.on_created(&event()).await;
    }
}
