//! Message bus sink using the RabbitMQ management HTTP API
//!
//! `init` declares the exchange, the queue named after the routing key and
//! the binding between them. Every event is then published as a persistent
//! message with the event JSON as payload.
//!
//! The management API publish endpoint opens a channel per request and is
//! not meant for high message rates. A message the broker accepts but
//! cannot route to any queue counts as a failed delivery.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{check_response, deliver, report_failure, Sink, SinkKind};
use crate::config::RabbitMqConfig;
use crate::event::CanonicalEvent;
use crate::retry::{retry_with_backoff, RetryConfig, RetryError};
use crate::{Error, Result};

/// Publishes every event to an exchange
pub struct RabbitMqSink {
    config: RabbitMqConfig,
    servers: Vec<Url>,
    http: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Deserialize)]
struct PublishResponse {
    routed: bool,
}

impl RabbitMqSink {
    /// Create the sink; servers are parsed in `init`
    pub fn new(config: &RabbitMqConfig, http: reqwest::Client, retry: RetryConfig) -> Self {
        Self {
            config: config.clone(),
            servers: Vec::new(),
            http,
            retry,
        }
    }

    /// Management API URL on a random server
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        if self.servers.is_empty() {
            return Err(Error::sink("rabbitmq", "no servers configured"));
        }
        let i = rand::thread_rng().gen_range(0..self.servers.len());
        let mut url = self.servers[i].clone();
        url.path_segments_mut()
            .map_err(|_| Error::sink("rabbitmq", "server url cannot be a base"))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.config.user_name, Some(&self.config.password))
    }

    async fn declare(
        &self,
        what: &str,
        method: reqwest::Method,
        segments: &[&str],
        body: serde_json::Value,
    ) -> Result<()> {
        let url = self.api_url(segments)?;
        deliver(&self.retry, SinkKind::RabbitMq, what, || {
            self.request(method.clone(), url.clone()).json(&body)
        })
        .await?;
        debug!(declaration = %what, "Declared");
        Ok(())
    }

    async fn publish(&self, event: &CanonicalEvent) {
        if let Err(e) = self.try_publish(event).await {
            report_failure(SinkKind::RabbitMq, event, &e);
        }
    }

    async fn try_publish(&self, event: &CanonicalEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let body = json!({
            "properties": { "delivery_mode": 2, "content_type": "text/plain" },
            "routing_key": self.config.route_key,
            "payload": payload,
            "payload_encoding": "string",
        });
        let c = &self.config;

        let response: PublishResponse = retry_with_backoff(&self.retry, "publish message", || {
            let request = self
                .api_url(&["exchanges", c.vhost.as_str(), c.topic_name.as_str(), "publish"])
                .map(|url| self.request(reqwest::Method::POST, url).json(&body));
            async move {
                let request = request.map_err(RetryError::Permanent)?;
                check_response(SinkKind::RabbitMq, request.send().await)?
                    .json::<PublishResponse>()
                    .await
                    .map_err(|e| RetryError::Transient(Error::from(e)))
            }
        })
        .await?;

        if !response.routed {
            return Err(Error::sink(
                "rabbitmq",
                format!(
                    "message to exchange {:?} with routing key {:?} was not routed to any queue",
                    c.topic_name, c.route_key
                ),
            ));
        }
        info!(
            namespace = %event.namespace,
            name = %event.name,
            action = %event.action,
            kind = %event.kind,
            "Published message"
        );
        Ok(())
    }
}

#[async_trait]
impl Sink for RabbitMqSink {
    fn kind(&self) -> SinkKind {
        SinkKind::RabbitMq
    }

    async fn init(&mut self) -> Result<()> {
        self.servers = self
            .config
            .servers
            .iter()
            .map(|s| {
                Url::parse(s)
                    .map_err(|e| Error::sink("rabbitmq", format!("invalid server url {s:?}: {e}")))
            })
            .collect::<Result<_>>()?;
        if self.servers.is_empty() {
            return Err(Error::sink("rabbitmq", "no servers configured"));
        }

        let c = self.config.clone();
        self.declare(
            "declare exchange",
            reqwest::Method::PUT,
            &["exchanges", c.vhost.as_str(), c.topic_name.as_str()],
            json!({
                "type": c.exchange_type,
                "durable": c.durable,
                "auto_delete": false,
                "internal": false,
                "arguments": {},
            }),
        )
        .await?;

        if c.route_key.is_empty() {
            return Ok(());
        }
        self.declare(
            "declare queue",
            reqwest::Method::PUT,
            &["queues", c.vhost.as_str(), c.route_key.as_str()],
            json!({ "durable": c.durable, "auto_delete": false, "arguments": {} }),
        )
        .await?;
        self.declare(
            "declare binding",
            reqwest::Method::POST,
            &["bindings", c.vhost.as_str(), "e", c.topic_name.as_str(), "q", c.route_key.as_str()],
            json!({ "routing_key": c.route_key, "arguments": {} }),
        )
        .await
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.publish(event).await;
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.publish(event).await;
    }

    async fn on_deleted(&self, event: &CanonicalEvent) {
        self.publish(event).await;
    }
}
