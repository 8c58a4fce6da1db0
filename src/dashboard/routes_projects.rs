//! Project API: user-defined scopes, visibility, and their tasks.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{error_response, AppState};
use crate::habits::ProjectVisibility;

#[derive(Deserialize)]
pub(super) struct WindowQuery {
    window_days: Option<u32>,
}

/// GET /api/habits/projects: grouped into pinned, unpinned, and hidden.
pub(super) async fn handler_projects_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> Response {
    match state.tracker.project_list(params.window_days).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct NamePayload {
    name: String,
}

/// POST /api/habits/projects
pub(super) async fn handler_project_create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NamePayload>,
) -> Response {
    match state.tracker.create_project(&payload.name).await {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/habits/projects/{id}
pub(super) async fn handler_project_get(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
    Query(params): Query<WindowQuery>,
) -> Response {
    match state.tracker.project(id, params.window_days).await {
        Ok(project) => Json(project).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/habits/projects/{id}: removes the project's tasks as well.
pub(super) async fn handler_project_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
) -> Response {
    match state.tracker.delete_project(id).await {
        Ok(tasks) => Json(serde_json::json!({"ok": true, "tasks_deleted": tasks})).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/habits/projects/{id}/toggle-pin
pub(super) async fn handler_project_toggle_pin(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
) -> Response {
    match state.tracker.toggle_project_visibility(id).await {
        Ok(project) => Json(project).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct VisibilityPayload {
    visibility: i32,
}

/// POST /api/habits/projects/{id}/visibility: 0 hidden, 1 unpinned, 2 pinned.
pub(super) async fn handler_project_visibility(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
    Json(payload): Json<VisibilityPayload>,
) -> Response {
    let visibility = match ProjectVisibility::try_from(payload.visibility) {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    match state.tracker.set_project_visibility(id, visibility).await {
        Ok(project) => Json(project).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/habits/projects/{id}/rename
pub(super) async fn handler_project_rename(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
    Json(payload): Json<NamePayload>,
) -> Response {
    match state.tracker.rename_project(id, &payload.name).await {
        Ok(project) => Json(project).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/habits/projects/{id}/tasks
pub(super) async fn handler_project_tasks(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
) -> Response {
    match state.tracker.project_tasks(id).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => error_response(e),
    }
}
