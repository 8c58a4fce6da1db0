//! Health checks and the Prometheus scrape endpoint.
//!
//! `/readyz` reports 503 until the database answers within two seconds and
//! both sync hubs still accept control messages.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::Topic;

const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness: the process is serving HTTP.
pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness: database reachable and every hub task alive.
pub async fn handler_readyz(State(state): State<Arc<AppState>>) -> Response {
    let database = match tokio::time::timeout(READY_TIMEOUT, state.db().health_check()).await {
        Ok(Ok(())) => "ok",
        Ok(Err(_)) => "unreachable",
        Err(_) => "timeout",
    };

    let mut hubs = serde_json::Map::new();
    let mut hubs_ok = true;
    for topic in Topic::ALL {
        match state.tracker.hubs().hub(topic).subscriber_count().await {
            Ok(n) => {
                hubs.insert(topic.to_string(), serde_json::json!(n));
            }
            Err(_) => {
                hubs_ok = false;
                hubs.insert(topic.to_string(), serde_json::Value::Null);
            }
        }
    }

    let status = if database == "ok" && hubs_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({"database": database, "subscribers": hubs})),
    )
        .into_response()
}

/// Prometheus text exposition.
pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        state.prom_metrics.encode(),
    )
}
