//! Habit task API: windows, CRUD, comments, ordering, tags, export.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{error_response, AppState};
use crate::errors::HabitError;
use crate::habits::calendar::parse_date;
use crate::habits::{Direction, ExportFilter, ScopeKind, TaskDraft, TaskPatch, TaskStatus};

#[derive(Deserialize)]
pub(super) struct InWindowQuery {
    scope: i32,
    date: String,
}

/// GET /api/habits/in-window?scope=2&date=2024-07-01
pub(super) async fn handler_tasks_in_window(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InWindowQuery>,
) -> Response {
    let parsed = ScopeKind::try_from(params.scope)
        .and_then(|scope| parse_date(&params.date).map(|date| (scope, date)));
    let (scope, date) = match parsed {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    match state.tracker.tasks_in_window(scope, date).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct InDaysQuery {
    date: String,
    #[serde(default)]
    limit: u32,
}

/// GET /api/habits/in-days?date=2024-07-01&limit=15
pub(super) async fn handler_tasks_in_days(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InDaysQuery>,
) -> Response {
    let date = match parse_date(&params.date) {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };
    match state.tracker.tasks_in_days(date, params.limit).await {
        Ok(days) => Json(days).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/habits/in-month-and-days?date=2024-07-01&limit=15
pub(super) async fn handler_tasks_in_month_and_days(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InDaysQuery>,
) -> Response {
    let date = match parse_date(&params.date) {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };
    match state.tracker.tasks_in_month_and_days(date, params.limit).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct ExportPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    begin: String,
    #[serde(default)]
    end: String,
    #[serde(default)]
    day: bool,
}

fn optional_date(raw: &str) -> Result<Option<chrono::NaiveDate>, HabitError> {
    if raw.trim().is_empty() {
        Ok(None)
    } else {
        parse_date(raw.trim()).map(Some)
    }
}

/// POST /api/habits/export: plain-text log, one line per task.
pub(super) async fn handler_export(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExportPayload>,
) -> Response {
    let range = optional_date(&payload.begin)
        .and_then(|begin| optional_date(&payload.end).map(|end| (begin, end)));
    let (begin, end) = match range {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let filter = ExportFilter {
        name: payload.name,
        begin,
        end,
        day: payload.day,
    };
    match state.tracker.export(&filter).await {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateTaskPayload {
    name: String,
    date: String,
    scope: i32,
    status: Option<i32>,
    minutes: Option<i32>,
}

/// POST /api/habits/tasks
pub(super) async fn handler_task_create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTaskPayload>,
) -> Response {
    let draft = match TaskDraft::parse(
        &payload.name,
        &payload.date,
        payload.scope,
        payload.status,
        payload.minutes,
    ) {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };
    match state.tracker.create_task(draft).await {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/habits/tasks/{id}
pub(super) async fn handler_task_get(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    let mut task = match state.tracker.db().get_task(id).await {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(HabitError::not_found(format!("task {}", id))),
        Err(e) => return error_response(e),
    };
    match state.tracker.annotate(&mut task).await {
        Ok(()) => Json(task).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct UpdateTaskPayload {
    name: Option<String>,
    status: Option<i32>,
    minutes: Option<i32>,
    #[serde(default)]
    clear_minutes: bool,
}

/// POST /api/habits/tasks/{id}
pub(super) async fn handler_task_update(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Response {
    let status = match payload.status.map(TaskStatus::try_from).transpose() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let patch = TaskPatch {
        name: payload.name.map(|n| n.trim().to_string()),
        status,
        minutes: payload.minutes,
        clear_minutes: payload.clear_minutes,
    };
    match state.tracker.update_task(id, patch).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/habits/tasks/{id}
pub(super) async fn handler_task_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.tracker.delete_task(id).await {
        Ok(task) => Json(serde_json::json!({"ok": true, "id": task.id})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct CommentPayload {
    #[serde(default)]
    body: String,
}

/// POST /api/habits/tasks/{id}/comment: a blank body removes the comment.
pub(super) async fn handler_task_comment(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<CommentPayload>,
) -> Response {
    match state.tracker.update_comment(id, &payload.body).await {
        Ok(comment) => Json(serde_json::json!({"comment": comment})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn move_task(state: &AppState, id: i64, direction: Direction) -> Response {
    match state.tracker.move_task(id, direction).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/habits/tasks/{id}/move-up
pub(super) async fn handler_task_move_up(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    move_task(&state, id, Direction::Up).await
}

/// POST /api/habits/tasks/{id}/move-down
pub(super) async fn handler_task_move_down(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    move_task(&state, id, Direction::Down).await
}

/// POST /api/habits/reorder/{source}/{target}: place source right after target.
pub(super) async fn handler_reorder(
    State(state): State<Arc<AppState>>,
    AxumPath((source, target)): AxumPath<(i64, i64)>,
) -> Response {
    match state.tracker.reorder(source, target).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/habits/tasks/{id}/tags
pub(super) async fn handler_task_tags(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.tracker.db().tags_for_task(id).await {
        Ok(tags) => Json(tags).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub(super) struct TagPayload {
    tag: String,
}

/// POST /api/habits/tasks/{id}/tags
pub(super) async fn handler_task_tag_link(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<TagPayload>,
) -> Response {
    match state.tracker.link_tag(id, &payload.tag).await {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/habits/tasks/{id}/tags/{tag}
pub(super) async fn handler_task_tag_unlink(
    State(state): State<Arc<AppState>>,
    AxumPath((id, tag)): AxumPath<(i64, String)>,
) -> Response {
    match state.tracker.unlink_tag(id, &tag).await {
        Ok(removed) => Json(serde_json::json!({"removed": removed})).into_response(),
        Err(e) => error_response(e),
    }
}
