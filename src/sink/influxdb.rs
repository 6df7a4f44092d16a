//! Time-series sink using the InfluxDB 1.x `/write` line protocol endpoint

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{deliver, report_failure, Sink, SinkKind};
use crate::config::InfluxDbConfig;
use crate::event::{parse_timestamp, CanonicalEvent};
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Measurement every event point is written to
pub const MEASUREMENT: &str = "k8sevents";

/// Writes native events as points
pub struct InfluxDbSink {
    server: String,
    user_name: String,
    password: String,
    db_name: String,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl InfluxDbSink {
    /// Create the sink from its config section
    pub fn new(config: &InfluxDbConfig, http: reqwest::Client, retry: RetryConfig) -> Self {
        Self {
            server: config.server.trim_end_matches('/').to_string(),
            user_name: config.user_name.clone(),
            password: config.password.clone(),
            db_name: config.db_name.clone(),
            http,
            retry,
        }
    }

    async fn record(&self, event: &CanonicalEvent) {
        if !event.is_native_event() {
            return;
        }
        let line = line_protocol(event);
        let url = format!("{}/write", self.server);

        let result = deliver(&self.retry, SinkKind::InfluxDb, "write point", || {
            let request = self
                .http
                .post(&url)
                .query(&[("db", self.db_name.as_str()), ("precision", "s")])
                .body(line.clone());
            if self.user_name.is_empty() {
                request
            } else {
                request.basic_auth(&self.user_name, Some(&self.password))
            }
        })
        .await;

        match result {
            Ok(_) => debug!(db = %self.db_name, name = %event.name, "Wrote point"),
            Err(e) => report_failure(SinkKind::InfluxDb, event, &e),
        }
    }
}

#[async_trait]
impl Sink for InfluxDbSink {
    fn kind(&self) -> SinkKind {
        SinkKind::InfluxDb
    }

    async fn init(&mut self) -> Result<()> {
        reqwest::Url::parse(&self.server).map_err(|e| {
            Error::sink("influxdb", format!("invalid server url {:?}: {e}", self.server))
        })?;
        if self.db_name.is_empty() {
            return Err(Error::sink("influxdb", "dbName is empty"));
        }
        Ok(())
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.record(event).await;
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.record(event).await;
    }

    async fn on_deleted(&self, _event: &CanonicalEvent) {}
}

/// Render one event as a line protocol point.
///
/// The point time is the creation time in seconds offset by the resource
/// version, so repeated occurrences of the same event land on distinct
/// timestamps instead of overwriting each other.
pub fn line_protocol(event: &CanonicalEvent) -> String {
    let mut line = String::from(MEASUREMENT);

    let tags = [
        ("namespace", &event.namespace),
        ("kind", &event.kind),
        ("kind_name", &event.name),
        ("reason", &event.reason),
        ("type", &event.type_),
    ];
    for (key, value) in tags {
        // Empty tag values are not valid line protocol
        if !value.is_empty() {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(&escape_tag(value));
        }
    }

    let string_fields = [
        ("message", &event.message),
        ("source_component", &event.component),
        ("source_host", &event.host),
        ("firstTimestamp", &event.first_timestamp),
        ("lastTimestamp", &event.last_timestamp),
        ("createTimestamp", &event.creation_timestamp),
        ("evt_name", &event.name),
        ("resourceVersion", &event.resource_version),
    ];
    line.push(' ');
    line.push_str(&format!("count={}i", event.count));
    for (key, value) in string_fields {
        line.push(',');
        line.push_str(key);
        line.push_str("=\"");
        line.push_str(&escape_field(value));
        line.push('"');
    }

    let created = parse_timestamp(&event.creation_timestamp)
        .map(|t| t.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp());
    let offset = event.resource_version.parse::<i64>().unwrap_or(0);
    line.push(' ');
    line.push_str(&(created + offset).to_string());
    line
}

fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
