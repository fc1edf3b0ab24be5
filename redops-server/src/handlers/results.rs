//! Read-side result views.

use axum::{Json, extract::State};

use redops_core::results;
use redops_model::{HostSummary, ResultsTree};

use crate::AppState;
use crate::errors::AppResult;

pub async fn results_tree(State(state): State<AppState>) -> AppResult<Json<ResultsTree>> {
    let rows = state.tasks.completed_with_target().await?;
    Ok(Json(results::results_tree(&rows)))
}

pub async fn host_summaries(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<HostSummary>>> {
    let ips = state.hosts.list_ips().await?;
    let counts = state.hosts.severity_counts().await?;
    let rows = state.tasks.completed_with_target().await?;
    Ok(Json(results::host_summaries(&ips, &counts, &rows)))
}
