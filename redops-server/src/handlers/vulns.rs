//! Vulnerability search endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use redops_model::{Severity, VulnRow};

use crate::AppState;
use crate::errors::{AppError, AppResult};

const DEFAULT_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct VulnQuery {
    #[serde(default)]
    pub q: String,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<VulnQuery>,
) -> AppResult<Json<Vec<VulnRow>>> {
    let severity = query
        .severity
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Severity>()
                .map_err(|e| AppError::bad_request(e.to_string()))
        })
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 1000);

    Ok(Json(state.hosts.search_vulns(&query.q, severity, limit).await?))
}

pub async fn details(
    State(state): State<AppState>,
    Path(vuln_id): Path<i32>,
) -> AppResult<Json<Value>> {
    let details = state.hosts.vuln_details(vuln_id).await?;
    Ok(Json(json!({ "details": details })))
}
