//! Search index sink
//!
//! Events are indexed through the REST API, one document per create or
//! update. Writes rotate across the configured servers so a retry after a
//! failure lands on the next node. The same client serves the query API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{check_response, deliver, report_failure, Sink, SinkKind};
use crate::api::{EventQuery, EventStore};
use crate::config::ElasticsearchConfig;
use crate::event::CanonicalEvent;
use crate::retry::{retry_with_backoff, RetryConfig, RetryError};
use crate::{Error, Result};

/// Indexes events and answers event searches
#[derive(Clone)]
pub struct ElasticsearchSink {
    servers: Vec<String>,
    index: String,
    next: Arc<AtomicUsize>,
    http: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: CanonicalEvent,
}

impl ElasticsearchSink {
    /// Create the sink from its config section
    pub fn new(config: &ElasticsearchConfig, http: reqwest::Client, retry: RetryConfig) -> Self {
        Self {
            servers: config
                .servers
                .iter()
                .map(|s| s.trim_end_matches('/').to_string())
                .collect(),
            index: config.index.clone(),
            next: Arc::new(AtomicUsize::new(0)),
            http,
            retry,
        }
    }

    /// Next server in round-robin order
    fn server(&self) -> &str {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        &self.servers[n % self.servers.len()]
    }

    async fn save(&self, event: &CanonicalEvent) {
        let result = deliver(&self.retry, SinkKind::Elasticsearch, "index event", || {
            let url = format!("{}/{}/_doc", self.server(), self.index);
            self.http
                .post(url)
                .query(&[("refresh", "wait_for")])
                .json(event)
        })
        .await;

        match result {
            Ok(_) => debug!(index = %self.index, name = %event.name, "Indexed event"),
            Err(e) => report_failure(SinkKind::Elasticsearch, event, &e),
        }
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Elasticsearch
    }

    async fn init(&mut self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::sink("elasticsearch", "no servers configured"));
        }
        if self.index.is_empty() {
            return Err(Error::sink("elasticsearch", "index name is empty"));
        }
        for server in &self.servers {
            reqwest::Url::parse(server).map_err(|e| {
                Error::sink("elasticsearch", format!("invalid server url {server:?}: {e}"))
            })?;
        }
        Ok(())
    }

    async fn on_created(&self, event: &CanonicalEvent) {
        self.save(event).await;
    }

    async fn on_updated(&self, event: &CanonicalEvent) {
        self.save(event).await;
    }

    async fn on_deleted(&self, _event: &CanonicalEvent) {}
}

#[async_trait]
impl EventStore for ElasticsearchSink {
    async fn search(&self, query: &EventQuery) -> Result<Vec<CanonicalEvent>> {
        if self.servers.is_empty() {
            return Err(Error::sink("elasticsearch", "no servers configured"));
        }
        info!(
            involved_namespace = %query.namespace,
            involved_kind = %query.involved_kind,
            involved_name = %query.kind_name,
            limit = query.limit,
            "Searching events"
        );

        let body = json!({
            "from": 0,
            "size": query.limit,
            "query": {
                "bool": {
                    "must": [
                        { "match": { "involvedNamespace": { "query": query.namespace, "operator": "and" } } },
                        { "match": { "involvedKind": { "query": query.involved_kind, "operator": "and" } } },
                        { "match": { "involvedName": { "query": query.kind_name, "operator": "and" } } },
                    ]
                }
            }
        });

        let response = retry_with_backoff(&self.retry, "search events", || {
            let url = format!("{}/{}/_search", self.server(), self.index);
            let request = self.http.post(url).json(&body);
            async move {
                let response = check_response(SinkKind::Elasticsearch, request.send().await)?;
                response
                    .json::<SearchResponse>()
                    .await
                    .map_err(|e| RetryError::Permanent(Error::from(e)))
            }
        })
        .await?;

        Ok(response.hits.hits.into_iter().map(|h| h.source).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Action;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(servers: Vec<String>) -> ElasticsearchSink {
        ElasticsearchSink::new(
            &ElasticsearchConfig {
                enable: true,
                servers,
                index: "k8s-events".to_string(),
            },
            reqwest::Client::new(),
            RetryConfig::with_max_attempts(3).initial_delay(Duration::from_millis(1)),
        )
    }

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            kind: "events".to_string(),
            name: "web-1.17a".to_string(),
            namespace: "shop".to_string(),
            reason: "BackOff".to_string(),
            involved_kind: "Pod".to_string(),
            involved_name: "web-1".to_string(),
            involved_namespace: "shop".to_string(),
            action: Action::Update,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn indexes_event_json_with_wait_for_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/k8s-events/_doc"))
            .and(query_param("refresh", "wait_for"))
            .and(body_partial_json(json!({
                "kind": "events",
                "action": "UPDATE",
                "involvedName": "web-1",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut s = sink(vec![format!("{}/", server.uri())]);
        s.init().await.unwrap();
        s.on_updated(&event()).await;
        s.on_deleted(&event()).await;
    }

    #[tokio::test]
    async fn retry_moves_to_next_server() {
        let down = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&down)
            .await;
        let up = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&up)
            .await;

        let s = sink(vec![down.uri(), up.uri()]);
        s.on_created(&event()).await;
    }

    #[tokio::test]
    async fn search_returns_sources() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/k8s-events/_search"))
            .and(body_partial_json(json!({ "size": 5 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [ { "_source": serde_json::to_value(event()).unwrap() } ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let s = sink(vec![server.uri()]);
        let found = s
            .search(&EventQuery {
                namespace: "shop".to_string(),
                kind_name: "web-1".to_string(),
                involved_kind: "Pod".to_string(),
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(found, vec![event()]);
    }

    #[tokio::test]
    async fn init_requires_servers() {
        let mut s = sink(Vec::new());
        assert!(s.init().await.is_err());
    }
}
