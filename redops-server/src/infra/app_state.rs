//! Shared handler state.

use std::sync::Arc;

use sqlx::PgPool;

use redops_core::db::{
    ChecklistRepository, HostRepository, TabRepository, TaskRepository,
    VarRepository,
};
use redops_core::{ModuleRegistry, Sandbox, TaskEngine};

use super::config::Config;

/// Everything the handlers need, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TaskEngine>,
    pub registry: Arc<ModuleRegistry>,
    pub tabs: TabRepository,
    pub tasks: TaskRepository,
    pub vars: VarRepository,
    pub hosts: HostRepository,
    pub checklist: ChecklistRepository,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        registry: Arc<ModuleRegistry>,
        sandbox: Arc<dyn Sandbox>,
        config: &Config,
    ) -> Self {
        let engine = Arc::new(TaskEngine::new(
            pool.clone(),
            Arc::clone(&registry),
            sandbox,
            config.logs_dir.clone(),
        ));
        Self {
            engine,
            registry,
            tabs: TabRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            vars: VarRepository::new(pool.clone()),
            hosts: HostRepository::new(pool.clone()),
            checklist: ChecklistRepository::new(pool),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
