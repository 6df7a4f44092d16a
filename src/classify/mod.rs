//! Event classification into alert receiver tiers
//!
//! Classification only looks at the reason, type, message and namespace of a
//! native cluster event. Lookups go user → admin → normal → warning and fall
//! back to the event type for reasons no table knows about. Unknown reasons
//! are never an error.

mod tables;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::CanonicalEvent;

pub use tables::{ClassificationTables, LIVENESS_KILLING_DESCRIPTION, POST_START_KILLING_DESCRIPTION};

/// Events whose last occurrence is older than this are not alerted on
pub const STALENESS_WINDOW: Duration = Duration::from_secs(30 * 60);

const LIVENESS_PROBE_MARKER: &str = "Container failed liveness probe";
const POST_START_HOOK_MARKER: &str = "FailedPostStartHook";

/// Who should receive an alert for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Informational, never alerted
    Normal,
    /// Owner of the application the event is about
    AppOwner,
    /// Cluster administrators
    Admin,
    /// Worth noting, not alerted
    Warning,
    /// Neither type nor reason recognized
    Unknown,
}

impl Tier {
    /// Wire name, as used in the `receivertype` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::AppOwner => "appowner",
            Self::Admin => "admin",
            Self::Warning => "warning",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    /// Human readable description of the reason
    pub description: String,
    /// Receiver tier
    pub tier: Tier,
}

impl Classification {
    fn new(description: impl Into<String>, tier: Tier) -> Self {
        Self {
            description: description.into(),
            tier,
        }
    }
}

/// Table-driven event classifier
#[derive(Clone, Debug, Default)]
pub struct Classifier {
    tables: Arc<ClassificationTables>,
}

impl Classifier {
    /// Create a classifier over shared tables
    pub fn new(tables: Arc<ClassificationTables>) -> Self {
        Self { tables }
    }

    /// The tables this classifier reads
    pub fn tables(&self) -> &ClassificationTables {
        &self.tables
    }

    /// Classify a native event. Pure apart from logging.
    pub fn classify(&self, event: &CanonicalEvent) -> Classification {
        let reason = event.reason.as_str();
        let t = &self.tables;

        if let Some(description) = t.user.get(reason) {
            if reason == "Killing" {
                return classify_killing(event, description);
            }
            let tier = if t.escalates(&event.namespace) {
                Tier::Admin
            } else {
                Tier::AppOwner
            };
            return Classification::new(description.as_str(), tier);
        }

        if let Some(description) = t.admin.get(reason) {
            info!(reason = %reason, message = %event.message, "Admin-tier event");
            return Classification::new(description.as_str(), Tier::Admin);
        }

        if let Some(description) = t.normal.get(reason) {
            return Classification::new(description.as_str(), Tier::Normal);
        }

        if let Some(description) = t.warning.get(reason) {
            info!(reason = %reason, description = %description, "Warning-tier event");
            return Classification::new(description.as_str(), Tier::Warning);
        }

        let tier = match event.type_.as_str() {
            "Warning" => {
                warn!(reason = %reason, name = %event.name, "Unknown Warning event escalated to admin");
                Tier::Admin
            }
            "Normal" => Tier::Normal,
            other => {
                warn!(reason = %reason, event_type = %other, "Unknown event type");
                Tier::Unknown
            }
        };
        Classification::new(reason, tier)
    }
}

fn classify_killing(event: &CanonicalEvent, description: &str) -> Classification {
    if event.message.contains(LIVENESS_PROBE_MARKER) {
        Classification::new(LIVENESS_KILLING_DESCRIPTION, Tier::AppOwner)
    } else if event.message.contains(POST_START_HOOK_MARKER) {
        Classification::new(POST_START_KILLING_DESCRIPTION, Tier::AppOwner)
    } else {
        debug!(message = %event.message, "Routine container kill");
        Classification::new(description, Tier::Normal)
    }
}

/// Whether `event` last happened more than [`STALENESS_WINDOW`] before `now`.
///
/// An unparsable `lastTimestamp` is logged and treated as fresh.
pub fn is_stale(event: &CanonicalEvent, now: DateTime<Utc>) -> bool {
    match event.last_seen() {
        Some(last) => {
            now.signed_duration_since(last).num_seconds() > STALENESS_WINDOW.as_secs() as i64
        }
        None => {
            warn!(
                last_timestamp = %event.last_timestamp,
                name = %event.name,
                "Could not parse lastTimestamp, not suppressing"
            );
            false
        }
    }
}
