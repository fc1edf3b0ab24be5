//! # Redops Server
//!
//! Control plane for scan orchestration during authorized penetration
//! tests. Serves the HTTP API, owns the database schema, and wires the
//! module registry, the sandbox, and the task engine together.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use redops_core::db::schema;
use redops_core::{DockerSandbox, ModuleRegistry, db};
use redops_server::{AppState, Config, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let pool = db::connect(&config.database_url).await?;
    let checklist = schema::load_checklist_seed(&config.checklist_file);
    schema::init_schema(&pool, &checklist).await?;

    tokio::fs::create_dir_all(&config.logs_dir)
        .await
        .with_context(|| format!("creating log directory {:?}", config.logs_dir))?;

    let registry = Arc::new(ModuleRegistry::new(&config.modules_dir));
    let loaded = registry.reload()?;
    info!(modules = loaded, dir = ?config.modules_dir, "module registry loaded");

    let sandbox = Arc::new(DockerSandbox::new(config.container.clone()));
    let state = AppState::new(pool, registry, sandbox, &config);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "redops-server listening");

    axum::serve(listener, routes::router(state))
        .await
        .context("server terminated")?;
    Ok(())
}
