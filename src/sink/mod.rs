//! Output sinks
//!
//! A sink receives every dispatched [`CanonicalEvent`]. Writes are
//! fire-and-forget from the controller's point of view: each adapter retries
//! on its own with [`retry_with_backoff`] and logs what it could not deliver.
//! The set of sink kinds is closed and resolved once at start-up.

mod alert;
mod elasticsearch;
mod influxdb;
mod log;
mod rabbitmq;
mod webhook;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::classify::Classifier;
use crate::config::Config;
use crate::event::CanonicalEvent;
use crate::metrics;
use crate::retry::{retry_with_backoff, RetryConfig, RetryError};
use crate::{Error, Result};

pub use alert::{AlertOutcome, AlertSink};
pub use elasticsearch::ElasticsearchSink;
pub use influxdb::{line_protocol, InfluxDbSink};
pub use log::LogSink;
pub use rabbitmq::RabbitMqSink;
pub use webhook::{WebhookSink, WEBHOOK_URL_ENV};

/// The closed set of sink implementations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Structured log record per event
    Log,
    /// Alert forwarding
    Alert,
    /// Generic webhook
    Webhook,
    /// Search index
    Elasticsearch,
    /// Time-series store
    InfluxDb,
    /// Message bus
    RabbitMq,
}

impl SinkKind {
    /// Config/metric name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Alert => "alert",
            Self::Webhook => "webhook",
            Self::Elasticsearch => "elasticsearch",
            Self::InfluxDb => "influxdb",
            Self::RabbitMq => "rabbitmq",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An output destination for canonical events.
///
/// The notification methods never fail: adapters absorb and log their own
/// errors so one broken destination cannot stall the pipeline.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sink: Send + Sync {
    /// Which kind of sink this is
    fn kind(&self) -> SinkKind;

    /// Prepare the sink (validate settings, declare remote resources)
    async fn init(&mut self) -> Result<()>;

    /// A live create observed after start
    async fn on_created(&self, event: &CanonicalEvent);

    /// An object changed
    async fn on_updated(&self, event: &CanonicalEvent);

    /// An object was removed
    async fn on_deleted(&self, event: &CanonicalEvent);

    /// An object that existed before start, seen during the initial listing
    async fn on_replayed(&self, _event: &CanonicalEvent) {}
}

/// Which notification to deliver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Live create
    Created,
    /// Update
    Updated,
    /// Delete
    Deleted,
    /// Startup replay of a pre-existing object
    Replayed,
}

/// A resolved sink
#[derive(Clone)]
pub struct SinkRegistration {
    /// Sink kind
    pub kind: SinkKind,
    /// Whether events are delivered to it
    pub enabled: bool,
    /// The adapter
    pub handler: Arc<dyn Sink>,
}

impl fmt::Debug for SinkRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRegistration")
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// All registered sinks; dispatch fans out to every enabled one concurrently
#[derive(Clone, Debug, Default)]
pub struct SinkSet {
    registrations: Vec<SinkRegistration>,
}

impl SinkSet {
    /// Build a set from already initialized registrations
    pub fn new(registrations: Vec<SinkRegistration>) -> Self {
        Self { registrations }
    }

    /// Registered sinks, enabled or not
    pub fn registrations(&self) -> &[SinkRegistration] {
        &self.registrations
    }

    /// Kinds that will receive events
    pub fn enabled_kinds(&self) -> Vec<SinkKind> {
        self.registrations
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.kind)
            .collect()
    }

    /// Deliver `event` to every enabled sink and wait for all of them
    pub async fn dispatch(&self, notification: Notification, event: &CanonicalEvent) {
        let deliveries = self
            .registrations
            .iter()
            .filter(|r| r.enabled)
            .map(|r| async move {
                match notification {
                    Notification::Created => r.handler.on_created(event).await,
                    Notification::Updated => r.handler.on_updated(event).await,
                    Notification::Deleted => r.handler.on_deleted(event).await,
                    Notification::Replayed => r.handler.on_replayed(event).await,
                }
            });
        join_all(deliveries).await;
    }
}

/// Build and initialize every sink enabled in `config`.
///
/// A sink whose `init` fails is logged and left out.
pub async fn resolve_sinks(
    config: &Config,
    http: reqwest::Client,
    classifier: Classifier,
) -> SinkSet {
    let retry = RetryConfig::from(&config.settings.retry);
    let h = &config.handlers;

    let mut candidates: Vec<Box<dyn Sink>> = Vec::new();
    if config.settings.log_events {
        candidates.push(Box::new(LogSink::new()));
    }
    if h.alert.enable {
        candidates.push(Box::new(AlertSink::new(
            &h.alert,
            &config.k8s.cluster_name,
            classifier,
            http.clone(),
            retry.clone(),
        )));
    }
    if h.webhook.enable {
        candidates.push(Box::new(WebhookSink::new(&h.webhook, http.clone(), retry.clone())));
    }
    if h.elasticsearch.enable {
        candidates.push(Box::new(ElasticsearchSink::new(
            &h.elasticsearch,
            http.clone(),
            retry.clone(),
        )));
    }
    if h.influxdb.enable {
        candidates.push(Box::new(InfluxDbSink::new(&h.influxdb, http.clone(), retry.clone())));
    }
    if h.rabbitmq.enable {
        candidates.push(Box::new(RabbitMqSink::new(&h.rabbitmq, http, retry)));
    }

    let mut registrations = Vec::with_capacity(candidates.len());
    for mut sink in candidates {
        let kind = sink.kind();
        match sink.init().await {
            Ok(()) => {
                info!(sink = %kind, "Sink initialized");
                registrations.push(SinkRegistration {
                    kind,
                    enabled: true,
                    handler: Arc::from(sink),
                });
            }
            Err(e) => error!(sink = %kind, error = %e, "Sink failed to initialize, skipping"),
        }
    }

    if registrations.is_empty() {
        warn!("No sinks registered, events will be dropped");
    }
    SinkSet::new(registrations)
}

/// Whether retrying a request that got `status` cannot help
pub fn is_permanent_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

/// Map a send result onto the retry taxonomy
pub(crate) fn check_response(
    sink: SinkKind,
    result: reqwest::Result<Response>,
) -> std::result::Result<Response, RetryError<Error>> {
    let response = result.map_err(|e| RetryError::Transient(Error::from(e)))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let err = Error::sink(sink.as_str(), format!("unexpected status {status}"));
    if is_permanent_status(status) {
        Err(RetryError::Permanent(err))
    } else {
        Err(RetryError::Transient(err))
    }
}

/// Send the request produced by `build` with retries.
///
/// `build` runs once per attempt so adapters can vary the target.
pub(crate) async fn deliver<F>(
    retry: &RetryConfig,
    sink: SinkKind,
    operation: &str,
    mut build: F,
) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    retry_with_backoff(retry, operation, || {
        let request = build();
        async move { check_response(sink, request.send().await) }
    })
    .await
}

/// Count and log a write that could not be delivered
pub(crate) fn report_failure(sink: SinkKind, event: &CanonicalEvent, error: &Error) {
    metrics::record_sink_failure(sink.as_str());
    error!(
        sink = %sink,
        kind = %event.kind,
        namespace = %event.namespace,
        name = %event.name,
        action = %event.action,
        error = %error,
        "Failed to deliver event"
    );
}
