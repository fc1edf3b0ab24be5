//! Postgres persistence.
//!
//! Concrete repositories over a shared [`PgPool`], one per aggregate.
//! Queries are runtime-bound; schema creation is idempotent and runs at
//! startup (see [`schema`]).

pub mod checklist;
pub mod hosts;
pub mod schema;
pub mod tabs;
pub mod tasks;
pub mod vars;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::{EngineError, Result};

pub use checklist::ChecklistRepository;
pub use hosts::{HostRepository, SeverityCount};
pub use tabs::TabRepository;
pub use tasks::{CompletedTaskRow, TaskRepository};
pub use vars::VarRepository;

/// Connect to Postgres and verify the connection is usable.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    info!("connecting to PostgreSQL");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| {
            EngineError::Internal(format!("failed to connect to PostgreSQL: {e}"))
        })?;

    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await?;

    info!("connected to PostgreSQL");
    Ok(pool)
}
