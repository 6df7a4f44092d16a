//! k8swatch - Kubernetes resource watcher and event fan-out
//!
//! k8swatch watches a configurable set of cluster resource types, turns
//! every observed change into a normalized event record and delivers it to
//! the configured sinks: structured logs, an alerting endpoint, a generic
//! webhook, a search index, a time-series database and a message bus.
//!
//! # Pipeline
//!
//! watch notification → work queue → worker looks the object up in the
//! local cache (or treats it as deleted) → [`event::normalize`] →
//! [`sink::SinkSet::dispatch`] to every registered sink. Sink writes are
//! retried with exponential backoff; queue items that keep failing are
//! requeued a bounded number of times and then dropped.
//!
//! # Modules
//!
//! - [`event`] - Canonical event record and the normalizer
//! - [`classify`] - Alert tier classification of native cluster events
//! - [`controller`] - Per-resource-type controller and its work queue
//! - [`watch`] - kube-rs watcher/reflector driver feeding the controllers
//! - [`runner`] - Starts one controller per enabled resource type
//! - [`sink`] - Sink trait, registry and adapters
//! - [`retry`] - Bounded exponential backoff for sink writes
//! - [`api`] - HTTP query API
//! - [`config`] - YAML configuration
//! - [`metrics`] - OpenTelemetry counters and the JSON snapshot
//! - [`telemetry`] - Logging and OTLP setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod api;
pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod metrics;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod telemetry;
pub mod watch;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the query API
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Requeues allowed for a failing work item before it is dropped
pub const MAX_RETRIES: u32 = 5;
