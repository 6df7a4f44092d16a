//! Pipeline metrics
//!
//! Every counter is recorded twice: once on the OpenTelemetry global meter
//! (exported over OTLP when telemetry is configured) and once in a
//! process-local atomic that backs the `/metrics` JSON snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use serde::Serialize;

/// Global meter for k8swatch metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("k8swatch"));

// ============================================================================
// Controller Metrics
// ============================================================================

/// Counter of events handed to the sink set
///
/// Labels:
/// - `kind`: plural resource kind
/// - `action`: CREATE, UPDATE, DELETE
pub static EVENTS_DISPATCHED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_events_dispatched_total")
        .with_description("Total number of events dispatched to sinks")
        .with_unit("{events}")
        .build()
});

/// Counter of creates replayed from the initial listing
///
/// Labels:
/// - `kind`: plural resource kind
pub static EVENTS_REPLAYED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_events_replayed_total")
        .with_description("Total number of pre-start objects replayed at startup")
        .with_unit("{events}")
        .build()
});

/// Counter of updates skipped because the resource version did not change
pub static UPDATES_SKIPPED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_updates_skipped_total")
        .with_description("Total number of updates skipped on unchanged resource version")
        .with_unit("{events}")
        .build()
});

/// Counter of work items requeued after a processing error
pub static ITEMS_REQUEUED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_items_requeued_total")
        .with_description("Total number of work items requeued after an error")
        .with_unit("{items}")
        .build()
});

/// Counter of work items dropped after exhausting retries
pub static ITEMS_DROPPED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_items_dropped_total")
        .with_description("Total number of work items dropped after max retries")
        .with_unit("{items}")
        .build()
});

// ============================================================================
// Sink Metrics
// ============================================================================

/// Counter of sink writes that failed after retries
///
/// Labels:
/// - `sink`: log, alert, webhook, elasticsearch, influxdb, rabbitmq
pub static SINK_FAILURES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_sink_failures_total")
        .with_description("Total number of sink writes that failed")
        .with_unit("{writes}")
        .build()
});

/// Counter of alerts forwarded to the alert server
///
/// Labels:
/// - `tier`: admin, appowner
pub static ALERTS_SENT: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_alerts_sent_total")
        .with_description("Total number of alerts forwarded")
        .with_unit("{alerts}")
        .build()
});

/// Counter of alerts suppressed because the event was stale
pub static STALE_SUPPRESSED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("k8swatch_stale_events_suppressed_total")
        .with_description("Total number of stale events not alerted on")
        .with_unit("{events}")
        .build()
});

// ============================================================================
// Local Snapshot
// ============================================================================

#[derive(Default)]
struct Totals {
    dispatched: AtomicU64,
    replayed: AtomicU64,
    updates_skipped: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    sink_failures: AtomicU64,
    alerts_sent: AtomicU64,
    stale_suppressed: AtomicU64,
}

static TOTALS: Lazy<Totals> = Lazy::new(Totals::default);

/// Process-local counter totals since start
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub events_dispatched: u64,
    pub events_replayed: u64,
    pub updates_skipped: u64,
    pub items_requeued: u64,
    pub items_dropped: u64,
    pub sink_failures: u64,
    pub alerts_sent: u64,
    pub stale_suppressed: u64,
}

/// Read the current totals
pub fn snapshot() -> MetricsSnapshot {
    let t = &*TOTALS;
    MetricsSnapshot {
        events_dispatched: t.dispatched.load(Ordering::Relaxed),
        events_replayed: t.replayed.load(Ordering::Relaxed),
        updates_skipped: t.updates_skipped.load(Ordering::Relaxed),
        items_requeued: t.requeued.load(Ordering::Relaxed),
        items_dropped: t.dropped.load(Ordering::Relaxed),
        sink_failures: t.sink_failures.load(Ordering::Relaxed),
        alerts_sent: t.alerts_sent.load(Ordering::Relaxed),
        stale_suppressed: t.stale_suppressed.load(Ordering::Relaxed),
    }
}

// ============================================================================
// Recording Helpers
// ============================================================================

/// Record an event dispatched to the sink set
pub fn record_dispatch(kind: &str, action: &str) {
    TOTALS.dispatched.fetch_add(1, Ordering::Relaxed);
    EVENTS_DISPATCHED.add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("action", action.to_string()),
        ],
    );
}

/// Record a startup replay
pub fn record_replay(kind: &str) {
    TOTALS.replayed.fetch_add(1, Ordering::Relaxed);
    EVENTS_REPLAYED.add(1, &[KeyValue::new("kind", kind.to_string())]);
}

/// Record an update skipped on unchanged resource version
pub fn record_update_skipped(kind: &str) {
    TOTALS.updates_skipped.fetch_add(1, Ordering::Relaxed);
    UPDATES_SKIPPED.add(1, &[KeyValue::new("kind", kind.to_string())]);
}

/// Record a work item requeue
pub fn record_requeue(kind: &str) {
    TOTALS.requeued.fetch_add(1, Ordering::Relaxed);
    ITEMS_REQUEUED.add(1, &[KeyValue::new("kind", kind.to_string())]);
}

/// Record a work item dropped after max retries
pub fn record_drop(kind: &str) {
    TOTALS.dropped.fetch_add(1, Ordering::Relaxed);
    ITEMS_DROPPED.add(1, &[KeyValue::new("kind", kind.to_string())]);
}

/// Record a failed sink write
pub fn record_sink_failure(sink: &str) {
    TOTALS.sink_failures.fetch_add(1, Ordering::Relaxed);
    SINK_FAILURES.add(1, &[KeyValue::new("sink", sink.to_string())]);
}

/// Record a forwarded alert
pub fn record_alert(tier: &str) {
    TOTALS.alerts_sent.fetch_add(1, Ordering::Relaxed);
    ALERTS_SENT.add(1, &[KeyValue::new("tier", tier.to_string())]);
}

/// Record a stale event suppressed by the alert path
pub fn record_stale_suppressed() {
    TOTALS.stale_suppressed.fetch_add(1, Ordering::Relaxed);
    STALE_SUPPRESSED.add(1, &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Totals are process-wide and tests run in parallel, so only assert
    // monotonic growth.
    #[test]
    fn recording_increments_snapshot() {
        let before = snapshot();
        record_dispatch("pods", "CREATE");
        record_drop("pods");
        record_sink_failure("webhook");
        let after = snapshot();

        assert!(after.events_dispatched > before.events_dispatched);
        assert!(after.items_dropped > before.items_dropped);
        assert!(after.sink_failures > before.sink_failures);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(MetricsSnapshot::default()).unwrap();
        assert_eq!(json["eventsDispatched"], 0);
        assert_eq!(json["staleSuppressed"], 0);
    }
}
