//! Alert forwarding
//!
//! Only native cluster events are considered. Each one is checked for
//! staleness, classified, and forwarded when its tier is enabled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::{deliver, report_failure, Sink, SinkKind};
use crate::classify::{is_stale, Classifier, Tier};
use crate::config::AlertConfig;
use crate::event::CanonicalEvent;
use crate::metrics;
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// What the alert path did with an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Not a native event
    Ignored,
    /// Older than the staleness window
    Stale,
    /// Classified, but the tier is not forwarded
    Suppressed(Tier),
    /// Forwarded
    Sent(Tier),
    /// Forwarding failed after retries
    Failed(Tier),
}

#[derive(Serialize)]
struct AlertMessage<'a> {
    #[serde(flatten)]
    event: &'a CanonicalEvent,
    subject: String,
}

/// Forwards classified events to the alert server
pub struct AlertSink {
    server: String,
    cluster_name: String,
    enable_admin: bool,
    enable_app_owner: bool,
    classifier: Classifier,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl AlertSink {
    /// Create the sink from its config section
    pub fn new(
        config: &AlertConfig,
        cluster_name: &str,
        classifier: Classifier,
        http: reqwest::Client,
        retry: RetryConfig,
    ) -> Self {
        Self {
            server: config.server.clone(),
            cluster_name: cluster_name.to_string(),
            enable_admin: config.enable_admin_alert,
            enable_app_owner: config.enable_app_owner_alert,
            classifier,
            http,
            retry,
        }
    }

    fn tier_enabled(&self, tier: Tier) -> bool {
        match tier {
            Tier::Admin => self.enable_admin,
            Tier::AppOwner => self.enable_app_owner,
            Tier::Normal | Tier::Warning | Tier::Unknown => false,
        }
    }

    /// Run one event through staleness, classification and forwarding
    pub async fn process(&self, event: &CanonicalEvent, now: DateTime<Utc>) -> AlertOutcome {
        if !event.is_native_event() {
            return AlertOutcome::Ignored;
        }
        if is_stale(event, now) {
            metrics::record_stale_suppressed();
            info!(
                name = %event.name,
                last_timestamp = %event.last_timestamp,
                "Event older than 30 minutes, not alerting"
            );
            return AlertOutcome::Stale;
        }

        let classification = self.classifier.classify(event);
        let tier = classification.tier;
        let subject = format!(
            "{} {} {}/{}",
            self.cluster_name, classification.description, event.namespace, event.service_name
        );

        info!(
            subject = %subject,
            receiver_type = %tier,
            reason = %event.reason,
            namespace = %event.namespace,
            name = %event.name,
            count = event.count,
            event_type = %event.type_,
            service_name = %event.service_name,
            event_source_host = %event.host,
            last_timestamp = %event.last_timestamp,
            "{}",
            event.message
        );

        if !self.tier_enabled(tier) {
            debug!(receiver_type = %tier, subject = %subject, "Tier not forwarded");
            return AlertOutcome::Suppressed(tier);
        }

        let message = AlertMessage { event, subject };
        let result = deliver(&self.retry, SinkKind::Alert, "forward alert", || {
            self.http
                .post(&self.server)
                .query(&[("receivertype", tier.as_str())])
                .json(&message)
        })
        .await;

        match result {
            Ok(_) => {
                metrics::record_alert(tier.as_str());
                AlertOutcome::Sent(tier)
            }
            Err(e) => {
                report_failure(SinkKind::Alert, event, &e);
                AlertOutcome::Failed(tier)
            }
        }
    }
}

#[async_trait]
impl Sink for AlertSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Alert
    }

    async fn init(&mut self) -> Result<()> {
        reqwest::Url::parse(&self.server)
            .map_err(|e| Error::sink("alert", format!("invalid server url {:?}: {e}", self.server)))?;
        if self.cluster_name.is_empty() {
            tracing::warn!("k8s.clusterName is empty, alert subjects will lack a cluster name");
        }
        Ok(())
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.process(event, Utc::now()).await;
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.process(event, Utc::now()).await;
    }

    async fn on_deleted(&self, _event: &CanonicalEvent) {}
}
