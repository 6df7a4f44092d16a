//! Error types for k8swatch
//!
//! Errors carry enough context (resource kind, object key, sink name) to be
//! useful in a log line without the surrounding span.

use std::time::Duration;

use thiserror::Error;

/// Main error type for k8swatch operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid or unreadable configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// The watch cache did not finish its initial listing in time
    #[error("watch cache for {kind} did not sync within {timeout:?}")]
    CacheSync {
        /// Resource kind whose cache failed to sync (e.g. "pods")
        kind: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Local cache lookup failed
    #[error("cache lookup failed for {key}: {message}")]
    Cache {
        /// Object key that was being looked up
        key: String,
        /// Description of what failed
        message: String,
    },

    /// A sink rejected or failed to accept a write
    #[error("sink {sink} error: {message}")]
    Sink {
        /// Sink name (e.g. "elasticsearch")
        sink: String,
        /// Description of what failed
        message: String,
    },

    /// HTTP transport error
    #[error("http error: {source}")]
    Http {
        /// The underlying reqwest error
        #[from]
        source: reqwest::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g. "controller", "watch", "api")
        context: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a cache sync timeout error
    pub fn cache_sync(kind: impl Into<String>, timeout: Duration) -> Self {
        Self::CacheSync {
            kind: kind.into(),
            timeout,
        }
    }

    /// Create a cache lookup error
    pub fn cache(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cache {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a sink error for the named sink
    pub fn sink(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

impl From<yaml_rust2::ScanError> for Error {
    fn from(e: yaml_rust2::ScanError) -> Self {
        Self::config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: how failures surface from each layer of the pipeline
    // ==========================================================================

    /// Story: a controller whose cache never syncs reports which resource
    /// type is left unmonitored and how long it waited.
    #[test]
    fn story_cache_sync_failure_names_the_resource_type() {
        let err = Error::cache_sync("pods", Duration::from_secs(60));
        let msg = err.to_string();
        assert!(msg.contains("pods"));
        assert!(msg.contains("60s"));

        match err {
            Error::CacheSync { kind, timeout } => {
                assert_eq!(kind, "pods");
                assert_eq!(timeout, Duration::from_secs(60));
            }
            _ => panic!("Expected CacheSync variant"),
        }
    }

    /// Story: sink failures say which destination failed so operators can
    /// tell a broken search index from a broken alert forwarder.
    #[test]
    fn story_sink_errors_identify_the_destination() {
        let err = Error::sink("elasticsearch", "503 Service Unavailable");
        assert_eq!(
            err.to_string(),
            "sink elasticsearch error: 503 Service Unavailable"
        );

        let err = Error::sink("alert", "connection refused");
        assert!(err.to_string().contains("alert"));
    }

    /// Story: a bad config file is rejected with the parser's explanation.
    #[test]
    fn story_invalid_yaml_becomes_config_error() {
        let yaml_err = yaml_rust2::YamlLoader::load_from_str("settings: [unclosed")
            .expect_err("yaml should not parse");
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().starts_with("configuration error:"));
    }

    #[test]
    fn cache_and_internal_errors_carry_context() {
        let err = Error::cache("default/web-1", "store poisoned");
        assert_eq!(
            err.to_string(),
            "cache lookup failed for default/web-1: store poisoned"
        );

        let err = Error::internal("watch", "stream ended");
        assert_eq!(err.to_string(), "internal error [watch]: stream ended");
    }

    #[test]
    fn json_errors_become_serialization_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
