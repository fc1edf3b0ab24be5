//! Demand-driven liveness reconciliation.
//!
//! There is no background scheduler: whenever a tab's task list is read,
//! every `running` task is probed and the ones whose process exited are
//! settled. Because several pollers can observe the same exit concurrently,
//! the `running → parsing` transition is a compare-and-swap in the database
//! and only the winner consolidates.

use tracing::{debug, warn};

use redops_model::ScanTask;

use crate::error::Result;
use crate::sandbox::Liveness;

use super::TaskEngine;

impl TaskEngine {
    /// Settle every running task in the tab whose process has exited.
    pub(super) async fn reconcile_tab(&self, tab_id: i32) -> Result<()> {
        for task in self.tasks.running_for_tab(tab_id).await? {
            let alive = match task.pid {
                Some(pid) => self.sandbox.probe(pid).await == Liveness::Alive,
                // A running task without a pid lost its process record
                // (crashed mid-launch); settle it with whatever is in the log.
                None => false,
            };
            if alive {
                continue;
            }

            if !self.tasks.claim_for_parsing(task.id).await? {
                debug!(task_id = task.id, "another poller claimed this task");
                continue;
            }

            if let Err(err) = self.settle(&task).await {
                warn!(task_id = task.id, %err, "failed to settle finished step");
            }
        }
        Ok(())
    }

    /// One finished step, claim already won: consolidate the log, tick the
    /// checklist, harvest extraction variables, then parse and advance.
    async fn settle(&self, task: &ScanTask) -> Result<()> {
        let step_output = match &task.log_file {
            Some(log_file) => {
                let output = tokio::fs::read_to_string(log_file)
                    .await
                    .unwrap_or_default();
                if let Err(err) = tokio::fs::remove_file(log_file).await {
                    debug!(task_id = task.id, %err, "step log already gone");
                }
                output
            }
            None => String::new(),
        };

        let merged = ScanTask::merge_output(task.result_content.as_deref(), &step_output);
        self.tasks.store_result(task.id, &merged).await?;

        self.tick_checklist(task).await;

        let mut context = task.context.clone();
        if let Some(module) = self.registry.get(&task.module_id) {
            if let Some(extracts) = module.extracts_for_step(task.current_step as usize) {
                for (var, regex) in extracts {
                    let Some(caps) = regex.captures(&step_output) else {
                        continue;
                    };
                    let matched = caps.get(1).or_else(|| caps.get(0));
                    if let Some(matched) = matched {
                        let value = matched.as_str().trim().to_string();
                        debug!(task_id = task.id, var, %value, "extracted context variable");
                        context.insert(var.clone(), value);
                    }
                }
            }
        }
        self.tasks.advance_step(task.id, &context).await?;

        // Findings land after every step so partial workflow output is
        // already searchable; the parser also settles the display state.
        self.parser.parse(task.id).await?;
        self.advance(task.id).await
    }

    /// Mark the module's checklist items done for this target. Best-effort:
    /// an unknown key must not block task completion.
    async fn tick_checklist(&self, task: &ScanTask) {
        let Some(module) = self.registry.get(&task.module_id) else {
            return;
        };
        let Some(keys) = &module.def.checklist_keys else {
            return;
        };
        for key in keys {
            if let Err(err) = self.checklist.set_checked(&task.target, key, true).await {
                warn!(task_id = task.id, key, %err, "checklist update failed");
            }
        }
    }
}
