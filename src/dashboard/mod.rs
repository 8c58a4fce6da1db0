//! # Dashboard: HTTP API and Live Sync Server
//!
//! Runs an Axum HTTP server exposing the habit API, the per-topic websocket
//! sync endpoints, health checks, and Prometheus metrics. Optionally serves
//! a built frontend from `static_dir`.
//!
//! ## Routes
//!
//! | Prefix | Module |
//! |--------|--------|
//! | `/api/habits/...` tasks, windows, ordering, export | [`routes_habits`] |
//! | `/api/habits/projects...` | [`routes_projects`] |
//! | `/sync/{topic}` | [`websocket`] |
//! | `/healthz`, `/readyz`, `/metrics` | [`routes_health`] |
//!
//! Errors are returned as `{"error": "..."}` with 404 for missing records,
//! 400 for malformed input, and 500 for storage failures.

mod routes_habits;
mod routes_health;
mod routes_projects;
mod websocket;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use crate::config::Config;
use crate::db::Database;
use crate::errors::HabitError;
use crate::habits::Tracker;
use crate::prom_metrics::{self, Metrics};
use crate::sync::HubRegistry;

pub struct AppState {
    pub tracker: Tracker,
    pub prom_metrics: Arc<Metrics>,
    pub config: Config,
}

impl AppState {
    /// Wire storage, hubs, and metrics together. Spawns the hub tasks, so it
    /// must run inside a Tokio runtime.
    pub fn with_db(db: Database, config: Config) -> Arc<Self> {
        let prom_metrics = Arc::new(Metrics::new());
        let hubs = HubRegistry::new(config.sync_queue_capacity, Arc::clone(&prom_metrics));
        let tracker = Tracker::new(
            db,
            hubs,
            Arc::clone(&prom_metrics),
            config.stats_cache,
            config.project_window_days,
        );
        Arc::new(AppState {
            tracker,
            prom_metrics,
            config,
        })
    }

    pub fn db(&self) -> &Database {
        self.tracker.db()
    }
}

/// Map a core error to a JSON error response.
pub(super) fn error_response(err: HabitError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse numeric ids and uuids into placeholders to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .route("/sync/{topic}", get(websocket::handler_ws))
        .route(
            "/api/habits/in-window",
            get(routes_habits::handler_tasks_in_window),
        )
        .route(
            "/api/habits/in-days",
            get(routes_habits::handler_tasks_in_days),
        )
        .route(
            "/api/habits/in-month-and-days",
            get(routes_habits::handler_tasks_in_month_and_days),
        )
        .route("/api/habits/export", post(routes_habits::handler_export))
        .route("/api/habits/tasks", post(routes_habits::handler_task_create))
        .route(
            "/api/habits/tasks/{id}",
            get(routes_habits::handler_task_get)
                .post(routes_habits::handler_task_update)
                .delete(routes_habits::handler_task_delete),
        )
        .route(
            "/api/habits/tasks/{id}/comment",
            post(routes_habits::handler_task_comment),
        )
        .route(
            "/api/habits/tasks/{id}/move-up",
            post(routes_habits::handler_task_move_up),
        )
        .route(
            "/api/habits/tasks/{id}/move-down",
            post(routes_habits::handler_task_move_down),
        )
        .route(
            "/api/habits/tasks/{id}/tags",
            get(routes_habits::handler_task_tags).post(routes_habits::handler_task_tag_link),
        )
        .route(
            "/api/habits/tasks/{id}/tags/{tag}",
            axum::routing::delete(routes_habits::handler_task_tag_unlink),
        )
        .route(
            "/api/habits/reorder/{source}/{target}",
            post(routes_habits::handler_reorder),
        )
        .route(
            "/api/habits/projects",
            get(routes_projects::handler_projects_list).post(routes_projects::handler_project_create),
        )
        .route(
            "/api/habits/projects/{id}",
            get(routes_projects::handler_project_get).delete(routes_projects::handler_project_delete),
        )
        .route(
            "/api/habits/projects/{id}/toggle-pin",
            post(routes_projects::handler_project_toggle_pin),
        )
        .route(
            "/api/habits/projects/{id}/visibility",
            post(routes_projects::handler_project_visibility),
        )
        .route(
            "/api/habits/projects/{id}/rename",
            post(routes_projects::handler_project_rename),
        )
        .route(
            "/api/habits/projects/{id}/tasks",
            get(routes_projects::handler_project_tasks),
        );

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(1024 * 1024))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(30),
    ))
    .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    let database = Database::connect(config.database_url()?, config.db_max_connections).await?;
    database.migrate().await?;

    let port = config.port;
    let static_dir = config.static_dir.clone();
    let state = AppState::with_db(database, config);
    let app = build_router(state, static_dir.as_deref());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "habitsync running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("habitsync shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
