//! Global variable endpoints.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use redops_model::SetVarRequest;

use crate::AppState;
use crate::errors::AppResult;

pub async fn list_vars(
    State(state): State<AppState>,
) -> AppResult<Json<BTreeMap<String, String>>> {
    Ok(Json(state.vars.all().await?))
}

pub async fn set_var(
    State(state): State<AppState>,
    Json(req): Json<SetVarRequest>,
) -> AppResult<Json<Value>> {
    state.vars.set(&req.key, &req.value).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn delete_var(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<Value>> {
    state.vars.delete(&key).await?;
    Ok(Json(json!({ "status": "ok" })))
}
