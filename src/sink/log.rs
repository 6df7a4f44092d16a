//! Log sink: one structured `info` record per event
//!
//! Records go to the `k8swatch::events` target, so they can be filtered
//! separately from the service logs. Replayed objects are logged too.

use async_trait::async_trait;
use tracing::info;

use super::{Sink, SinkKind};
use crate::event::CanonicalEvent;
use crate::Result;

/// Emits each event as a structured log record
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    /// Create the log sink
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, notification: &str, event: &CanonicalEvent) {
        info!(
            target: "k8swatch::events",
            notification,
            kind = %event.kind,
            namespace = %event.namespace,
            name = %event.name,
            action = %event.action,
            reason = %event.reason,
            event_type = %event.type_,
            host = %event.host,
            resource_version = %event.resource_version,
            "{}",
            event.message
        );
    }
}

#[async_trait]
impl Sink for LogSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Log
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.emit("created", event);
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.emit("updated", event);
    }

    async fn on_deleted(&self, event: &CanonicalEvent) {
        self.emit("deleted", event);
    }

    async fn on_replayed(&self, event: &CanonicalEvent) {
        self.emit("replayed", event);
    }
}
