//! HTTP query API
//!
//! Routes:
//! - `GET /events?namespace=&kind_name=&limit=` - stored events for a pod,
//!   newest format compatible with older dashboards
//! - `GET /healthz` - liveness
//! - `GET /metrics` - JSON snapshot of the pipeline counters
//! - `POST /stop` - trigger graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::event::{parse_timestamp, CanonicalEvent};
use crate::metrics::{self, MetricsSnapshot};
use crate::{Error, Result};

/// Results returned when `limit` is absent or not a positive number
pub const DEFAULT_LIMIT: usize = 10;

/// Involved object kind searched by `/events`
pub const QUERY_INVOLVED_KIND: &str = "Pod";

/// Filter for a stored-event search
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    /// Involved object namespace
    pub namespace: String,
    /// Involved object name
    pub kind_name: String,
    /// Involved object kind
    pub involved_kind: String,
    /// Maximum number of hits
    pub limit: usize,
}

/// Backend that can answer event searches
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Find stored events matching `query`
    async fn search(&self, query: &EventQuery) -> Result<Vec<CanonicalEvent>>;
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Search backend, absent when no index sink is configured
    pub store: Option<Arc<dyn EventStore>>,
    /// Process-wide stop signal
    pub shutdown: CancellationToken,
}

impl ApiState {
    /// Create API state
    pub fn new(store: Option<Arc<dyn EventStore>>, shutdown: CancellationToken) -> Self {
        Self { store, shutdown }
    }
}

/// API errors
#[derive(Debug)]
pub enum ApiError {
    /// No search backend configured
    NoStore,
    /// The backend failed
    Store(Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoStore => (
                StatusCode::SERVICE_UNAVAILABLE,
                "event search is not configured".to_string(),
            ),
            ApiError::Store(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Query string for `/events`
#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    namespace: Option<String>,
    kind_name: Option<String>,
    limit: Option<String>,
}

impl EventsParams {
    fn into_query(self) -> EventQuery {
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT);
        EventQuery {
            namespace: self.namespace.unwrap_or_default(),
            kind_name: self.kind_name.unwrap_or_default(),
            involved_kind: QUERY_INVOLVED_KIND.to_string(),
            limit,
        }
    }
}

/// Flat record shape served by `/events`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Occurrence count
    pub count: i32,
    /// Creation time (RFC 3339), null when unparsable
    #[serde(rename = "createTimestamp")]
    pub create_timestamp: Option<String>,
    /// Event object name
    pub evt_name: String,
    /// First occurrence
    #[serde(rename = "firstTimestamp")]
    pub first_timestamp: String,
    /// Resource type
    pub kind: String,
    /// Object name
    pub kind_name: String,
    /// Most recent occurrence
    #[serde(rename = "lastTimestamp")]
    pub last_timestamp: String,
    /// Human-readable message
    pub message: String,
    /// Namespace
    pub namespace: String,
    /// Event reason
    pub reason: String,
    /// Always empty
    #[serde(rename = "resourceVersion")]
    pub resource_version: String,
    /// Reporting component
    pub source_component: String,
    /// Reporting host
    pub source_host: String,
    /// Same as `lastTimestamp`
    pub time: String,
    /// Normal or Warning
    #[serde(rename = "type")]
    pub type_: String,
}

impl From<CanonicalEvent> for EventRecord {
    fn from(e: CanonicalEvent) -> Self {
        let create_timestamp = match parse_timestamp(&e.creation_timestamp) {
            Some(t) => Some(t.to_rfc3339()),
            None => {
                warn!(timestamp = %e.creation_timestamp, name = %e.name, "Unparsable creation timestamp");
                None
            }
        };
        Self {
            count: e.count,
            create_timestamp,
            evt_name: e.name.clone(),
            first_timestamp: e.first_timestamp,
            kind: e.kind,
            kind_name: e.name,
            time: e.last_timestamp.clone(),
            last_timestamp: e.last_timestamp,
            message: e.message,
            namespace: e.namespace,
            reason: e.reason,
            resource_version: String::new(),
            source_component: e.component,
            source_host: e.host,
            type_: e.type_,
        }
    }
}

/// `GET /events`
pub async fn events_handler(
    State(state): State<ApiState>,
    Query(params): Query<EventsParams>,
) -> std::result::Result<Json<Vec<EventRecord>>, ApiError> {
    let store = state.store.as_ref().ok_or(ApiError::NoStore)?;
    let query = params.into_query();
    debug!(namespace = %query.namespace, kind_name = %query.kind_name, limit = query.limit, "Event query");

    let events = store.search(&query).await.map_err(|e| {
        error!(error = %e, "Event search failed");
        ApiError::Store(e)
    })?;
    if events.is_empty() {
        debug!(namespace = %query.namespace, kind_name = %query.kind_name, "No events found");
    }
    Ok(Json(events.into_iter().map(EventRecord::from).collect()))
}

/// `GET /healthz`
pub async fn healthz_handler() -> &'static str {
    "OK"
}

/// `GET /metrics`
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics::snapshot())
}

/// `POST /stop`
pub async fn stop_handler(State(state): State<ApiState>) -> StatusCode {
    info!("Stop requested over HTTP");
    state.shutdown.cancel();
    StatusCode::ACCEPTED
}

/// Build the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stop", post(stop_handler))
        .with_state(state)
}

/// Serve the API on `addr` until `state.shutdown` fires
pub async fn serve(addr: SocketAddr, state: ApiState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::internal("api", format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "Query API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::internal("api", format!("server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mockall::predicate::eq;
    use tower::ServiceExt;

    fn stored_event() -> CanonicalEvent {
        CanonicalEvent {
            kind: "events".to_string(),
            name: "web-1.17a".to_string(),
            namespace: "shop".to_string(),
            reason: "BackOff".to_string(),
            type_: "Warning".to_string(),
            count: 4,
            message: "Back-off restarting failed container".to_string(),
            component: "kubelet".to_string(),
            host: "node-a".to_string(),
            creation_timestamp: "2024-01-02 03:04:05".to_string(),
            first_timestamp: "2024-01-02 03:04:05".to_string(),
            last_timestamp: "2024-01-02 03:14:05".to_string(),
            resource_version: "99".to_string(),
            ..Default::default()
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn events_returns_flat_records() {
        let mut store = MockEventStore::new();
        store
            .expect_search()
            .with(eq(EventQuery {
                namespace: "shop".to_string(),
                kind_name: "web-1".to_string(),
                involved_kind: "Pod".to_string(),
                limit: 3,
            }))
            .times(1)
            .returning(|_| Ok(vec![stored_event()]));

        let app = router(ApiState::new(Some(Arc::new(store)), CancellationToken::new()));
        let response = app
            .oneshot(get_request("/events?namespace=shop&kind_name=web-1&limit=3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let record = &json[0];
        assert_eq!(record["evt_name"], "web-1.17a");
        assert_eq!(record["kind_name"], "web-1.17a");
        assert_eq!(record["count"], 4);
        assert_eq!(record["createTimestamp"], "2024-01-02T03:04:05+00:00");
        assert_eq!(record["time"], "2024-01-02 03:14:05");
        assert_eq!(record["resourceVersion"], "");
        assert_eq!(record["source_component"], "kubelet");
        assert_eq!(record["source_host"], "node-a");
        assert_eq!(record["type"], "Warning");
    }

    #[tokio::test]
    async fn events_limit_defaults_to_ten() {
        let mut store = MockEventStore::new();
        store
            .expect_search()
            .withf(|q| q.limit == DEFAULT_LIMIT && q.namespace.is_empty())
            .times(2)
            .returning(|_| Ok(Vec::new()));
        let app = router(ApiState::new(Some(Arc::new(store)), CancellationToken::new()));

        for uri in ["/events", "/events?limit=abc"] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, serde_json::json!([]));
        }
    }

    #[tokio::test]
    async fn events_without_store_is_unavailable() {
        let app = router(ApiState::new(None, CancellationToken::new()));
        let response = app.oneshot(get_request("/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn events_store_failure_is_bad_gateway() {
        let mut store = MockEventStore::new();
        store
            .expect_search()
            .returning(|_| Err(Error::sink("elasticsearch", "connection refused")));
        let app = router(ApiState::new(Some(Arc::new(store)), CancellationToken::new()));

        let response = app.oneshot(get_request("/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn healthz_and_metrics() {
        let app = router(ApiState::new(None, CancellationToken::new()));

        let response = app.clone().oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK");

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json.get("eventsDispatched").is_some());
    }

    #[tokio::test]
    async fn stop_cancels_shutdown_token() {
        let token = CancellationToken::new();
        let app = router(ApiState::new(None, token.clone()));

        let request = Request::builder()
            .method("POST")
            .uri("/stop")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(token.is_cancelled());
    }

    #[test]
    fn unparsable_creation_time_becomes_null() {
        let mut e = stored_event();
        e.creation_timestamp = "yesterday".to_string();
        let record = EventRecord::from(e);
        assert_eq!(record.create_timestamp, None);
    }
}
