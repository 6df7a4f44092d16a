//! YAML configuration
//!
//! The file is parsed with yaml-rust2, converted to a JSON value and then
//! deserialized into [`Config`]. Every field has a default so a partial file
//! (or an empty one) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::info;
use yaml_rust2::{Yaml, YamlLoader};

use crate::event::ResourceKind;
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "K8SWATCH_CONFIG";

/// Locations searched, in order, when no path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./configs/default.yaml",
    "/etc/k8swatch/configs/default.yaml",
];

/// Root of the configuration file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Cluster connection
    pub k8s: K8sConfig,
    /// Process settings
    pub settings: Settings,
    /// Resource types and whether each is watched
    pub resources: Vec<ResourceToggle>,
    /// Sink configuration
    pub handlers: HandlersConfig,
}

/// Cluster connection settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct K8sConfig {
    /// Name used in alert subjects
    pub cluster_name: String,
    /// Kubeconfig file; in-cluster or default discovery when unset
    pub kubeconfig: Option<PathBuf>,
}

/// Output format of the log subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human readable
    Plain,
}

/// Process settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Query API listen port
    pub http_port: u16,
    /// Workers per resource controller
    pub threadiness: usize,
    /// Default filter when RUST_LOG is unset
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// OTLP collector endpoint; `OTEL_EXPORTER_OTLP_ENDPOINT` when unset
    pub otlp_endpoint: Option<String>,
    /// Whether the log sink is registered
    pub log_events: bool,
    /// How long a controller waits for its cache to sync
    pub sync_timeout_secs: u64,
    /// Retry policy for sink writes
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: crate::DEFAULT_HTTP_PORT,
            threadiness: 1,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            otlp_endpoint: None,
            log_events: true,
            sync_timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Cache sync deadline
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

/// Sink retry policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Total attempts per write
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Cap on the delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let d = RetryConfig::default();
        Self {
            max_attempts: d.max_attempts,
            initial_delay_ms: d.initial_delay.as_millis() as u64,
            max_delay_ms: d.max_delay.as_millis() as u64,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts,
            initial_delay: Duration::from_millis(s.initial_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            ..Default::default()
        }
    }
}

/// One `resources[]` entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceToggle {
    /// Plural resource name, e.g. "pods"
    pub name: String,
    /// Whether it is watched
    pub enable: bool,
}

/// Per-sink configuration
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandlersConfig {
    pub alert: AlertConfig,
    pub webhook: WebhookConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub influxdb: InfluxDbConfig,
    pub rabbitmq: RabbitMqConfig,
}

/// Alert forwarding
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertConfig {
    /// Register the alert sink
    pub enable: bool,
    /// Forward admin-tier alerts
    pub enable_admin_alert: bool,
    /// Forward appowner-tier alerts
    pub enable_app_owner_alert: bool,
    /// Alert server URL
    pub server: String,
    /// Replaces the built-in escalation namespaces when set
    pub escalation_namespaces: Option<Vec<String>>,
}

/// Generic webhook
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    /// Register the webhook sink
    pub enable: bool,
    /// Target URL; `KW_WEBHOOK_URL` is used when empty
    pub url: String,
}

/// Search index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticsearchConfig {
    /// Register the elasticsearch sink
    pub enable: bool,
    /// Base URLs, used round-robin
    pub servers: Vec<String>,
    /// Index name
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            enable: false,
            servers: Vec::new(),
            index: "k8swatch".to_string(),
        }
    }
}

/// Time-series store
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InfluxDbConfig {
    pub enable: bool,
    pub server: String,
    pub user_name: String,
    pub password: String,
    pub db_name: String,
}

/// Message bus
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RabbitMqConfig {
    /// Register the rabbitmq sink
    pub enable: bool,
    /// Management API base URLs
    pub servers: Vec<String>,
    /// Exchange name
    pub topic_name: String,
    /// Exchange type (topic, direct, fanout, headers)
    pub exchange_type: String,
    /// Declare exchange and queue as durable
    pub durable: bool,
    /// Routing key, also the queue name
    pub route_key: String,
    /// Management API user
    pub user_name: String,
    /// Management API password
    pub password: String,
    /// Virtual host
    pub vhost: String,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            enable: false,
            servers: Vec::new(),
            topic_name: String::new(),
            exchange_type: "topic".to_string(),
            durable: true,
            route_key: String::new(),
            user_name: String::new(),
            password: String::new(),
            vhost: "/".to_string(),
        }
    }
}

impl Config {
    /// Parse a YAML document. Call [`Config::validate`] once overrides are applied.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let doc = YamlLoader::load_from_str(input)?
            .into_iter()
            .next()
            .unwrap_or(Yaml::Null);
        let value = match yaml_to_json(doc)? {
            Value::Null => Value::Object(Map::new()),
            v => v,
        };
        let config: Config =
            serde_json::from_value(value).map_err(|e| Error::config(e.to_string()))?;
        Ok(config)
    }

    /// Load from `path`, or from `K8SWATCH_CONFIG`, or the first default path
    /// that exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => resolve_path()?,
        };
        let input = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_yaml(&input)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply command-line overrides on top of the file settings
    pub fn with_overrides(mut self, threadiness: Option<usize>, http_port: Option<u16>) -> Self {
        if let Some(threadiness) = threadiness {
            self.settings.threadiness = threadiness;
        }
        if let Some(port) = http_port {
            self.settings.http_port = port;
        }
        self
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.settings.threadiness == 0 {
            return Err(Error::config("settings.threadiness must be at least 1"));
        }
        for r in &self.resources {
            r.name.parse::<ResourceKind>()?;
        }

        let h = &self.handlers;
        if h.alert.enable && h.alert.server.is_empty() {
            return Err(Error::config("handlers.alert.server is required when alert is enabled"));
        }
        if h.elasticsearch.enable && h.elasticsearch.servers.is_empty() {
            return Err(Error::config(
                "handlers.elasticsearch.servers is required when elasticsearch is enabled",
            ));
        }
        if h.influxdb.enable && (h.influxdb.server.is_empty() || h.influxdb.db_name.is_empty()) {
            return Err(Error::config(
                "handlers.influxdb.server and dbName are required when influxdb is enabled",
            ));
        }
        if h.rabbitmq.enable && (h.rabbitmq.servers.is_empty() || h.rabbitmq.topic_name.is_empty()) {
            return Err(Error::config(
                "handlers.rabbitmq.servers and topicName are required when rabbitmq is enabled",
            ));
        }
        Ok(())
    }

    /// Resource kinds marked `enable: true`, in file order, without duplicates
    pub fn enabled_resources(&self) -> Result<Vec<ResourceKind>> {
        let mut kinds = Vec::new();
        for r in self.resources.iter().filter(|r| r.enable) {
            let kind: ResourceKind = r.name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

fn resolve_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::config(format!(
                "no config file given and none found in {}",
                DEFAULT_CONFIG_PATHS.join(", ")
            ))
        })
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::config(format!("invalid number: {s}")))?,
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Hash(map) => {
            let mut object = Map::new();
            for (k, v) in map {
                let key = k
                    .into_string()
                    .ok_or_else(|| Error::config("config keys must be strings"))?;
                object.insert(key, yaml_to_json(v)?);
            }
            Value::Object(object)
        }
        Yaml::Alias(_) | Yaml::BadValue => {
            return Err(Error::config("unsupported YAML value"));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
k8s:
  clusterName: prod-east
settings:
  httpPort: 9090
  threadiness: 4
  logFormat: plain
  syncTimeoutSecs: 30
  retry:
    maxAttempts: 3
    initialDelayMs: 100
resources:
  - name: pods
    enable: true
  - name: events
    enable: true
  - name: secrets
    enable: false
handlers:
  alert:
    enable: true
    enableAdminAlert: true
    server: http://alert-speaker/api/alert
    escalationNamespaces: [kube-system, payments]
  elasticsearch:
    enable: true
    servers: ["http://es-1:9200", "http://es-2:9200"]
    index: k8s-events
  rabbitmq:
    enable: true
    servers: ["http://mq:15672"]
    topicName: k8s
    routeKey: events
"#;

    #[test]
    fn parses_full_file() {
        let c = Config::from_yaml(FULL).unwrap();
        assert_eq!(c.k8s.cluster_name, "prod-east");
        assert_eq!(c.settings.http_port, 9090);
        assert_eq!(c.settings.threadiness, 4);
        assert_eq!(c.settings.log_format, LogFormat::Plain);
        assert_eq!(c.settings.sync_timeout(), Duration::from_secs(30));
        assert!(c.settings.log_events, "unset fields keep defaults");

        let retry = RetryConfig::from(&c.settings.retry);
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(300));

        assert!(c.handlers.alert.enable_admin_alert);
        assert!(!c.handlers.alert.enable_app_owner_alert);
        assert_eq!(
            c.handlers.alert.escalation_namespaces,
            Some(vec!["kube-system".to_string(), "payments".to_string()])
        );
        assert_eq!(c.handlers.elasticsearch.servers.len(), 2);
        assert_eq!(c.handlers.rabbitmq.exchange_type, "topic");
        assert_eq!(c.handlers.rabbitmq.vhost, "/");
        assert!(!c.handlers.webhook.enable);
    }

    #[test]
    fn enabled_resources_skip_disabled_entries() {
        let c = Config::from_yaml(FULL).unwrap();
        assert_eq!(
            c.enabled_resources().unwrap(),
            vec![ResourceKind::Pods, ResourceKind::Events]
        );
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let c = Config::from_yaml("").unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.settings.http_port, 8080);
        assert_eq!(c.settings.threadiness, 1);
        assert!(c.enabled_resources().unwrap().is_empty());
    }

    #[test]
    fn unknown_resource_name_is_rejected() {
        let c = Config::from_yaml("resources:\n  - name: widgets\n    enable: true\n").unwrap();
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn zero_threadiness_is_rejected() {
        let c = Config::from_yaml("settings:\n  threadiness: 0\n").unwrap();
        assert!(matches!(c.validate().unwrap_err(), Error::Config { .. }));
    }

    #[test]
    fn cli_override_fixes_file_threadiness() {
        let c = Config::from_yaml("settings:\n  threadiness: 0\n")
            .unwrap()
            .with_overrides(Some(4), Some(9090));
        c.validate().unwrap();
        assert_eq!(c.settings.threadiness, 4);
        assert_eq!(c.settings.http_port, 9090);

        let kept = Config::from_yaml("settings:\n  threadiness: 2\n")
            .unwrap()
            .with_overrides(None, None);
        assert_eq!(kept.settings.threadiness, 2);
        assert_eq!(kept.settings.http_port, 8080);
    }

    #[test]
    fn enabled_sink_without_endpoint_is_rejected() {
        for yaml in [
            "handlers:\n  alert:\n    enable: true\n",
            "handlers:\n  elasticsearch:\n    enable: true\n",
            "handlers:\n  influxdb:\n    enable: true\n",
        ] {
            let c = Config::from_yaml(yaml).unwrap();
            assert!(c.validate().is_err(), "{yaml}");
        }
    }

    #[test]
    fn wrong_field_type_is_a_config_error() {
        let err = Config::from_yaml("settings:\n  httpPort: lots\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let c = Config::load(Some(file.path())).unwrap();
        assert_eq!(c.k8s.cluster_name, "prod-east");

        let missing = Config::load(Some(Path::new("/nonexistent/k8swatch.yaml")));
        assert!(missing.is_err());
    }
}
