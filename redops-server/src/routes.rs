//! Route table.

use axum::{
    Json, Router,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;
use crate::handlers::{checklist, modules, results, tabs, tasks, vars, vulns};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/modules", get(modules::list_modules))
        .route("/modules/reload", post(modules::reload_modules))
        .route("/tabs", get(tabs::list_tabs).post(tabs::create_tab))
        .route("/tabs/{tab_id}", put(tabs::rename_tab).delete(tabs::delete_tab))
        .route("/tabs/{tab_id}/tasks", get(tasks::list_tasks))
        .route("/tasks", post(tasks::create_task))
        .route("/tasks/{task_id}/start", post(tasks::start_task))
        .route("/tasks/{task_id}/stop", post(tasks::stop_task))
        .route("/tasks/{task_id}/output", get(tasks::task_output))
        .route("/tasks/{task_id}", delete(tasks::delete_task))
        .route("/vars", get(vars::list_vars).post(vars::set_var))
        .route("/vars/{key}", delete(vars::delete_var))
        .route("/checklist", get(checklist::checklist))
        .route("/checklist/toggle", post(checklist::toggle))
        .route("/results/tree", get(results::results_tree))
        .route("/results/host-summary", get(results::host_summaries))
        .route("/vulns", get(vulns::search))
        .route("/vulns/{vuln_id}/details", get(vulns::details));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
