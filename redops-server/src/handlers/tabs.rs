//! Scan tab endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use redops_model::TabInfo;

use crate::AppState;
use crate::errors::AppResult;

#[derive(Debug, Deserialize)]
pub struct TabRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn list_tabs(State(state): State<AppState>) -> AppResult<Json<Vec<TabInfo>>> {
    Ok(Json(state.tabs.list().await?))
}

pub async fn create_tab(
    State(state): State<AppState>,
    Json(req): Json<TabRequest>,
) -> AppResult<Json<Value>> {
    let id = state.tabs.create(&req.name).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn rename_tab(
    State(state): State<AppState>,
    Path(tab_id): Path<i32>,
    Json(req): Json<TabRequest>,
) -> AppResult<Json<Value>> {
    state.tabs.rename(tab_id, &req.name).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn delete_tab(
    State(state): State<AppState>,
    Path(tab_id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.tabs.delete(tab_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}
