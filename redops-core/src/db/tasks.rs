//! Scan task rows.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use redops_model::{ScanTask, StepContext, TaskStatus};

use crate::error::{EngineError, Result};

const TASK_COLUMNS: &str = "id, tab_id, module_id, module_name, command_executed, \
     status, pid, log_file, result_content, target, current_step, context, created_at";

#[derive(Clone, Debug)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a fresh pending task, returning its id.
    pub async fn insert(
        &self,
        tab_id: i32,
        module_id: &str,
        module_name: &str,
        command: &str,
        target: &str,
        context: &StepContext,
    ) -> Result<i32> {
        let context_json = serde_json::to_string(context)?;
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO scan_tasks
                (tab_id, module_id, module_name, command_executed, target, status, current_step, context)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6)
            RETURNING id
            "#,
        )
        .bind(tab_id)
        .bind(module_id)
        .bind(module_name)
        .bind(command)
        .bind(target)
        .bind(context_json)
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    /// Whether a task for this (module, target) already blocks a re-launch.
    pub async fn has_active_duplicate(
        &self,
        module_id: &str,
        target: &str,
    ) -> Result<bool> {
        let row: Option<i32> = sqlx::query_scalar(&duplicate_filter_sql())
            .bind(module_id)
            .bind(target)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn fetch(&self, task_id: i32) -> Result<ScanTask> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scan_tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
        map_task(row)
    }

    /// Every task in a tab except legacy `result` rows, newest first.
    pub async fn list_for_tab(&self, tab_id: i32) -> Result<Vec<ScanTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scan_tasks \
             WHERE tab_id = $1 AND status != 'result' ORDER BY id DESC"
        ))
        .bind(tab_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(map_task).collect()
    }

    /// Running tasks in a tab, the reconciler's work set.
    pub async fn running_for_tab(&self, tab_id: i32) -> Result<Vec<ScanTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scan_tasks \
             WHERE tab_id = $1 AND status = 'running' ORDER BY id"
        ))
        .bind(tab_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(map_task).collect()
    }

    /// Record a launched step: pid, log path, the rendered command.
    pub async fn mark_running(
        &self,
        task_id: i32,
        pid: i32,
        log_file: &str,
        command: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_tasks
            SET status = 'running', pid = $2, log_file = $3, command_executed = $4
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(pid)
        .bind(log_file)
        .bind(command)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Compare-and-swap `running → parsing`. Returns false when another
    /// poller already claimed this task; the caller must then back off.
    pub async fn claim_for_parsing(&self, task_id: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scan_tasks SET status = 'parsing' WHERE id = $1 AND status = 'running'",
        )
        .bind(task_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist consolidated output and clear the log-file pointer.
    pub async fn store_result(&self, task_id: i32, content: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scan_tasks SET result_content = $2, log_file = NULL WHERE id = $1",
        )
        .bind(task_id)
        .bind(content)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Persist extracted context and advance the step index.
    pub async fn advance_step(
        &self,
        task_id: i32,
        context: &StepContext,
    ) -> Result<()> {
        let context_json = serde_json::to_string(context)?;
        sqlx::query(
            "UPDATE scan_tasks SET context = $2, current_step = current_step + 1 WHERE id = $1",
        )
        .bind(task_id)
        .bind(context_json)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Skip a step without touching the context.
    pub async fn skip_step(&self, task_id: i32) -> Result<()> {
        sqlx::query(
            "UPDATE scan_tasks SET current_step = current_step + 1 WHERE id = $1",
        )
        .bind(task_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, task_id: i32, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE scan_tasks SET status = $2 WHERE id = $1")
            .bind(task_id)
            .bind(status.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete(&self, task_id: i32) -> Result<()> {
        sqlx::query("DELETE FROM scan_tasks WHERE id = $1")
            .bind(task_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Completed (or legacy `result`) tasks with a target, newest first —
    /// the results-tree source rows.
    pub async fn completed_with_target(&self) -> Result<Vec<CompletedTaskRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, module_name, target,
                   to_char(created_at, 'YYYY-MM-DD HH24:MI') AS date,
                   (result_content IS NOT NULL AND length(result_content) > 0) AS has_content
            FROM scan_tasks
            WHERE target IS NOT NULL AND status IN ('completed', 'result')
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CompletedTaskRow {
                    id: row.try_get("id")?,
                    module_name: row.try_get("module_name")?,
                    target: row.try_get("target")?,
                    date: row.try_get("date")?,
                    has_content: row.try_get("has_content")?,
                })
            })
            .collect()
    }
}

/// Flat row feeding the results-tree and host-summary projections.
#[derive(Debug, Clone)]
pub struct CompletedTaskRow {
    pub id: i32,
    pub module_name: String,
    pub target: String,
    pub date: String,
    pub has_content: bool,
}

/// Duplicate check driven by [`TaskStatus::DUPLICATE_BLOCKING`] so the SQL
/// cannot drift from the status model.
fn duplicate_filter_sql() -> String {
    let blocking = TaskStatus::DUPLICATE_BLOCKING
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT id FROM scan_tasks \
         WHERE module_id = $1 AND target = $2 AND status IN ({blocking}) \
         LIMIT 1"
    )
}

fn map_task(row: PgRow) -> Result<ScanTask> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw.parse::<TaskStatus>().map_err(|e| {
        EngineError::Internal(format!("corrupt status column: {e}"))
    })?;

    let context_raw: String = row.try_get("context")?;
    let context: StepContext = match serde_json::from_str(&context_raw) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%err, "task context column is not valid JSON, starting empty");
            StepContext::new()
        }
    };

    Ok(ScanTask {
        id: row.try_get("id")?,
        tab_id: row.try_get("tab_id")?,
        module_id: row.try_get("module_id")?,
        module_name: row.try_get("module_name")?,
        command: row.try_get("command_executed")?,
        status,
        pid: row.try_get("pid")?,
        log_file: row.try_get("log_file")?,
        result_content: row.try_get("result_content")?,
        target: row.try_get("target")?,
        current_step: row.try_get("current_step")?,
        context,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_filter_blocks_kept_runs_but_not_aborted() {
        let sql = duplicate_filter_sql();
        for status in TaskStatus::DUPLICATE_BLOCKING {
            assert!(sql.contains(&format!("'{status}'")), "missing {status}");
        }
        assert!(!sql.contains("'aborted'"));
        assert!(!sql.contains("'pending'"));
        assert!(!sql.contains("'result'"));
    }
}
