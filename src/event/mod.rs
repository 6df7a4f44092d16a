//! Canonical event model
//!
//! Every watched object, whatever its shape, is flattened into one
//! [`CanonicalEvent`] before it reaches a sink. The record is built once per
//! work item and shared read-only across all sink dispatches.

mod normalize;
mod resource;

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

pub use normalize::normalize;
pub use resource::{object_key, split_key, DeletedObject, ResourceKind, ResourceObject};

/// Sentinel written to `host` when the source object names no host
pub const EMPTY_HOST: &str = "Empty";

/// Layout of every timestamp string in a [`CanonicalEvent`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What happened to the object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Object added to the cache
    #[default]
    Create,
    /// Object changed
    Update,
    /// Object removed
    Delete,
}

impl Action {
    /// Upper-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, sink-agnostic record of one change
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanonicalEvent {
    /// Object namespace (empty for cluster-scoped objects)
    pub namespace: String,
    /// Plural resource kind (e.g. "pods", "events")
    pub kind: String,
    /// Source component, or service type for services
    pub component: String,
    /// Node the object lives on, or [`EMPTY_HOST`]
    pub host: String,
    /// Event reason (native events only)
    pub reason: String,
    /// Reserved status field
    pub status: String,
    /// Object name
    pub name: String,
    /// Creation time in [`TIMESTAMP_FORMAT`]
    pub creation_timestamp: String,
    /// Change that produced this record
    pub action: Action,
    /// Occurrence count (native events only)
    pub count: i32,
    /// Human readable summary
    #[serde(rename = "short_message")]
    pub message: String,
    /// Event type, "Normal" or "Warning" (native events only)
    #[serde(rename = "type")]
    pub type_: String,
    /// First occurrence in [`TIMESTAMP_FORMAT`]
    pub first_timestamp: String,
    /// Latest occurrence or condition transition in [`TIMESTAMP_FORMAT`]
    pub last_timestamp: String,
    /// Container name extracted from the involved field path
    pub service_name: String,
    /// Object resource version
    pub resource_version: String,
    /// Name of the object a native event is about
    pub involved_name: String,
    /// Namespace of the object a native event is about
    pub involved_namespace: String,
    /// Kind of the object a native event is about
    pub involved_kind: String,
    /// Resource version of the object a native event is about
    pub involved_resource_version: String,
}

impl CanonicalEvent {
    /// Synthesized summary line.
    ///
    /// Native events carry their own message, so this is empty for them.
    pub fn synthesized_message(&self) -> String {
        match self.kind.as_str() {
            "namespaces" | "nodes" => {
                format!("{}:{} has been {}D", self.kind, self.name, self.action)
            }
            "events" => String::new(),
            _ => format!(
                "{}:{} in namespace {} has been {}D",
                self.kind, self.name, self.namespace, self.action
            ),
        }
    }

    /// Whether this record describes a native cluster event
    pub fn is_native_event(&self) -> bool {
        self.kind == ResourceKind::Events.as_str()
    }

    /// Parse `last_timestamp` back into a UTC instant
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.last_timestamp)
    }
}

/// Render a Kubernetes timestamp in [`TIMESTAMP_FORMAT`]
pub fn format_time(time: &Time) -> String {
    format_datetime(&time.0)
}

/// Render a UTC instant in [`TIMESTAMP_FORMAT`]
pub fn format_datetime(time: &DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a [`TIMESTAMP_FORMAT`] string as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
