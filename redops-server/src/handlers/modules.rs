//! Module catalogue endpoints.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use redops_model::ModuleDefinition;

use crate::AppState;
use crate::errors::AppResult;

/// List the catalogue, refreshing it first so on-disk edits are visible
/// without a restart. A failed refresh falls back to the last snapshot.
pub async fn list_modules(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ModuleDefinition>>> {
    if let Err(err) = state.registry.reload() {
        tracing::warn!(%err, "module reload failed, serving previous snapshot");
    }
    Ok(Json(state.registry.list()))
}

/// Re-read the module directory. Returns the fresh count and snapshot
/// version so clients can detect that their cached catalogue is stale.
pub async fn reload_modules(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let count = state.registry.reload()?;
    Ok(Json(json!({
        "count": count,
        "version": state.registry.version(),
    })))
}
