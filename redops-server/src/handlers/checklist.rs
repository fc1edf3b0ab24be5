//! Engagement checklist endpoints.

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use redops_model::{ChecklistEntry, ToggleChecklistRequest};

use crate::AppState;
use crate::errors::AppResult;

pub async fn checklist(
    State(state): State<AppState>,
) -> AppResult<Json<BTreeMap<String, Vec<ChecklistEntry>>>> {
    Ok(Json(state.checklist.grouped().await?))
}

pub async fn toggle(
    State(state): State<AppState>,
    Json(req): Json<ToggleChecklistRequest>,
) -> AppResult<Json<Value>> {
    state
        .checklist
        .set_checked(&req.target, &req.key, req.is_checked)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}
