//! Task lifecycle endpoints.
//!
//! Listing a tab's tasks is also the liveness tick: the engine reconciles
//! finished processes before the rows are returned, so a UI polling this
//! endpoint drives workflows forward without any background scheduler.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use redops_model::{CreateTaskRequest, TaskSummary};

use crate::AppState;
use crate::errors::AppResult;

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(tab_id): Path<i32>,
) -> AppResult<Json<Vec<TaskSummary>>> {
    Ok(Json(state.engine.list(tab_id).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> AppResult<Json<Value>> {
    let task_id = state.engine.create(&req).await?;
    Ok(Json(json!({ "task_id": task_id })))
}

/// Kick a task forward: launches the current step (or finalizes the task)
/// regardless of how the previous attempt ended. Safe to call repeatedly.
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.engine.advance(task_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn task_output(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> AppResult<Json<Value>> {
    let output = state.engine.output(task_id).await?;
    Ok(Json(json!({ "output": output })))
}

pub async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.engine.stop(task_id).await?;
    Ok(Json(json!({ "status": "aborted" })))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.engine.delete(task_id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
