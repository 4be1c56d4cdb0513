//! Task API endpoints
//!
//! CRUD and bulk operations on tasks. Every reply is wrapped in the
//! response envelope.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

use td_core::envelope::ApiEnvelope;
use td_core::task::{BulkAction, Task, TaskDraft, TaskId, TaskPatch, TasksBulkRequest};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /tasks?page&limit - One page of live tasks, newest first
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiEnvelope<Vec<Task>>>, ApiError> {
    if query.page == 0 || query.limit == 0 {
        return Err(ApiError::Validation(
            "page and limit must be at least 1".to_string(),
        ));
    }

    let page = state.list(query.page, query.limit).await;
    Ok(Json(ApiEnvelope::page(page.tasks, page.pagination)))
}

/// POST /tasks - Create a new task
async fn create_task(
    State(state): State<AppState>,
    Json(draft): Json<TaskDraft>,
) -> Result<(StatusCode, Json<ApiEnvelope<Task>>), ApiError> {
    let task = state.create(draft).await?;
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(task))))
}

/// GET /tasks/{id} - Get a single task
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<ApiEnvelope<Task>>, ApiError> {
    let task = state.get(id).await?;
    Ok(Json(ApiEnvelope::ok(task)))
}

/// PUT /tasks/{id} - Partial update
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<ApiEnvelope<Task>>, ApiError> {
    let task = state.update(id, patch).await?;
    Ok(Json(ApiEnvelope::ok(task)))
}

/// DELETE /tasks/{id} - Soft delete
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    state.delete(id).await?;
    Ok(Json(ApiEnvelope::empty()))
}

async fn bulk(state: AppState, action: BulkAction, req: TasksBulkRequest) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    state.bulk(action, &req.task_ids).await?;
    Ok(Json(ApiEnvelope::empty()))
}

/// PATCH /tasks/bulk-complete
async fn bulk_complete(
    State(state): State<AppState>,
    Json(req): Json<TasksBulkRequest>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    bulk(state, BulkAction::Complete, req).await
}

/// PATCH /tasks/bulk-delete
async fn bulk_delete(
    State(state): State<AppState>,
    Json(req): Json<TasksBulkRequest>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    bulk(state, BulkAction::Delete, req).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/bulk-complete", patch(bulk_complete))
        .route("/tasks/bulk-delete", patch(bulk_delete))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}
