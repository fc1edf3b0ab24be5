//! Task orchestration.
//!
//! [`TaskEngine`] owns the task lifecycle: creating pending tasks,
//! launching steps in the sandbox, and tearing tasks down. Completion is
//! never observed by waiting on a process; the reconciler in
//! [`reconcile`](self) runs on demand when a tab's task list is requested
//! and settles every `running` task whose process has exited.

mod reconcile;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use redops_model::{
    CreateTaskRequest, ScanTask, StepContext, TaskStatus, TaskSummary,
};

use crate::db::{ChecklistRepository, TaskRepository, VarRepository};
use crate::error::{EngineError, Result};
use crate::parse::ResultParser;
use crate::registry::{CompiledModule, ModuleRegistry};
use crate::sandbox::Sandbox;
use crate::template;

/// Input keys tried, in order, to determine a task's target.
const TARGET_KEYS: [&str; 5] = ["target", "ip", "range", "host", "dc_ip"];

/// Target recorded for runs without a target-like input.
pub const WORKFLOW_TARGET: &str = "Workflow";

/// Orchestrates task execution end to end.
pub struct TaskEngine {
    tasks: TaskRepository,
    vars: VarRepository,
    checklist: ChecklistRepository,
    registry: Arc<ModuleRegistry>,
    sandbox: Arc<dyn Sandbox>,
    parser: ResultParser,
    log_dir: PathBuf,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("log_dir", &self.log_dir)
            .finish_non_exhaustive()
    }
}

impl TaskEngine {
    pub fn new(
        pool: PgPool,
        registry: Arc<ModuleRegistry>,
        sandbox: Arc<dyn Sandbox>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tasks: TaskRepository::new(pool.clone()),
            vars: VarRepository::new(pool.clone()),
            checklist: ChecklistRepository::new(pool.clone()),
            parser: ResultParser::new(pool, Arc::clone(&registry)),
            registry,
            sandbox,
            log_dir: log_dir.into(),
        }
    }

    /// Create a pending task for a module. Nothing runs until
    /// [`advance`](TaskEngine::advance) starts it.
    ///
    /// Rejects creation when the same (module, target) pair already has an
    /// active or kept run, so an operator cannot double-scan a target by
    /// accident. Aborted runs do not block.
    pub async fn create(&self, req: &CreateTaskRequest) -> Result<i32> {
        let module = self
            .registry
            .get(&req.module_id)
            .ok_or_else(|| EngineError::NotFound(format!("module '{}'", req.module_id)))?;

        let target = resolve_target(&req.inputs);
        if self.tasks.has_active_duplicate(&req.module_id, &target).await? {
            return Err(EngineError::Duplicate(format!(
                "module '{}' already ran against {target}",
                req.module_id
            )));
        }

        let context: StepContext = req.inputs.clone();
        let preview = command_preview(&module, &context);
        let task_id = self
            .tasks
            .insert(
                req.tab_id,
                &req.module_id,
                &module.def.name,
                &preview,
                &target,
                &context,
            )
            .await?;

        info!(task_id, module = %req.module_id, %target, "task created");
        Ok(task_id)
    }

    /// Launch the task's current step, skipping steps whose condition is
    /// not ready, and finalize the task once no steps remain.
    ///
    /// Re-entrant: the reconciler calls it after every step completion.
    /// Refused while a step is in flight (the running process owns the
    /// pid/log columns) and on aborted tasks (terminal by operator intent).
    pub async fn advance(&self, task_id: i32) -> Result<()> {
        let task = self.tasks.fetch(task_id).await?;
        if advance_blocked(task.status) {
            return Err(EngineError::Conflict(format!(
                "task {task_id} is {}",
                task.status
            )));
        }

        let Some(module) = self.registry.get(&task.module_id) else {
            warn!(task_id, module = %task.module_id, "module vanished, finalizing task");
            return self.finalize(task_id).await;
        };

        let mut subst = self.vars.all().await?;
        subst.extend(task.context.clone());

        let mut step_index = task.current_step;
        loop {
            match plan_step(&module, step_index, &subst) {
                StepPlan::Finalize => return self.finalize(task_id).await,
                StepPlan::Skip => {
                    debug!(task_id, step = step_index, "condition not ready, skipping step");
                    self.tasks.skip_step(task_id).await?;
                    step_index += 1;
                }
                StepPlan::Launch {
                    command,
                    label,
                    unresolved,
                } => {
                    if !unresolved.is_empty() {
                        warn!(
                            task_id,
                            step = step_index,
                            ?unresolved,
                            "command launched with unresolved placeholders"
                        );
                    }
                    return self
                        .launch_step(&task, &module, step_index, &command, &label)
                        .await;
                }
            }
        }
    }

    async fn launch_step(
        &self,
        task: &ScanTask,
        module: &CompiledModule,
        step_index: i32,
        command: &str,
        label: &str,
    ) -> Result<()> {
        let log_path = self.step_log_path(task.id, step_index);
        let total = module.def.step_count();
        // The parser skips lines containing "---", so the command line gets
        // the same markers as the step header.
        let banner = format!(
            "--- Step {}/{}: {} ---\n--- CMD: {} ---\n\n",
            step_index + 1,
            total,
            label,
            command
        );

        let env = self.vars.all().await?;
        let pid = self.sandbox.launch(command, &env, &log_path, &banner).await?;

        let stored = if module.def.is_workflow() {
            format!("[Step {}/{}] {}", step_index + 1, total, command)
        } else {
            command.to_string()
        };
        self.tasks
            .mark_running(task.id, pid, &log_path.to_string_lossy(), &stored)
            .await?;

        info!(task_id = task.id, step = step_index, pid, "step launched");
        Ok(())
    }

    /// Terminal transition: mark completed, then let the parser settle the
    /// final display state (it may flip the task to hidden).
    async fn finalize(&self, task_id: i32) -> Result<()> {
        self.tasks.set_status(task_id, TaskStatus::Completed).await?;
        self.parser.parse(task_id).await
    }

    /// Signal the running step and mark the task aborted. An aborted task
    /// never reaches the parser and does not block re-launching.
    pub async fn stop(&self, task_id: i32) -> Result<()> {
        let task = self.tasks.fetch(task_id).await?;
        if let Some(pid) = task.pid {
            self.sandbox.terminate(pid).await;
        }
        self.tasks.set_status(task_id, TaskStatus::Aborted).await?;
        info!(task_id, "task aborted");
        Ok(())
    }

    /// Remove the task and its step log, if one is still on disk.
    pub async fn delete(&self, task_id: i32) -> Result<()> {
        let task = self.tasks.fetch(task_id).await?;
        if let Some(log_file) = &task.log_file {
            if let Err(err) = tokio::fs::remove_file(log_file).await {
                debug!(task_id, %err, "step log already gone");
            }
        }
        self.tasks.delete(task_id).await
    }

    /// Current output. The step log wins whenever it is still on disk —
    /// running tasks, but also aborted ones, whose log is never
    /// consolidated — then the stored content, then a sentinel.
    pub async fn output(&self, task_id: i32) -> Result<String> {
        let task = self.tasks.fetch(task_id).await?;
        let live = match &task.log_file {
            Some(log_file) => tokio::fs::read_to_string(log_file).await.ok(),
            None => None,
        };
        Ok(render_output(live, task.result_content))
    }

    /// Tab task list, reconciled first so finished processes are settled
    /// before the rows go out.
    pub async fn list(&self, tab_id: i32) -> Result<Vec<TaskSummary>> {
        self.reconcile_tab(tab_id).await?;

        let tasks = self.tasks.list_for_tab(tab_id).await?;
        Ok(tasks.into_iter().map(summarize).collect())
    }

    fn step_log_path(&self, task_id: i32, step_index: i32) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        self.log_dir
            .join(format!("task_{task_id}_step_{step_index}_{stamp}.log"))
    }
}

/// Statuses from which `advance` must not launch: a running task already
/// owns its pid/log columns, and aborted is terminal by operator intent.
fn advance_blocked(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Running | TaskStatus::Aborted)
}

/// What to do with a task positioned at `step_index`, decided before any
/// side effect runs.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepPlan {
    /// No runnable step remains.
    Finalize,
    /// The step's condition did not resolve (or rendered blank).
    Skip,
    /// Launch this rendered command.
    Launch {
        command: String,
        label: String,
        unresolved: Vec<String>,
    },
}

fn plan_step(
    module: &CompiledModule,
    step_index: i32,
    subst: &BTreeMap<String, String>,
) -> StepPlan {
    if step_index >= module.def.step_count() as i32 {
        return StepPlan::Finalize;
    }

    let (template_cmd, label, condition) = match module.step(step_index as usize) {
        Some(step) => (
            step.command.as_str(),
            step.label(step_index as usize),
            step.condition.as_deref(),
        ),
        None => match module.def.command.as_deref() {
            Some(command) => (command, "Execution".to_string(), None),
            // Neither command nor steps: nothing to run.
            None => return StepPlan::Finalize,
        },
    };

    if let Some(condition) = condition {
        if !template::render(condition, subst).is_ready_condition() {
            return StepPlan::Skip;
        }
    }

    let rendered = template::render(template_cmd, subst);
    StepPlan::Launch {
        command: rendered.text,
        label,
        unresolved: rendered.unresolved,
    }
}

fn render_output(live: Option<String>, stored: Option<String>) -> String {
    if let Some(live) = live {
        if !live.is_empty() {
            return live;
        }
    }
    match stored {
        Some(content) if !content.is_empty() => content,
        _ => "No output available yet.".to_string(),
    }
}

/// First non-blank target-like input, else the workflow sentinel.
fn resolve_target(inputs: &BTreeMap<String, String>) -> String {
    TARGET_KEYS
        .iter()
        .filter_map(|key| inputs.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| WORKFLOW_TARGET.to_string())
}

/// Command shown in the task list before the first step launches.
fn command_preview(module: &CompiledModule, inputs: &StepContext) -> String {
    match module.def.command.as_deref() {
        Some(command) if !module.def.is_workflow() => {
            template::render(command, inputs).text
        }
        _ => format!("[workflow] {}", module.def.name),
    }
}

fn summarize(task: ScanTask) -> TaskSummary {
    let has_log = task.log_file.is_some()
        || task.result_content.as_deref().is_some_and(|c| !c.is_empty());
    TaskSummary {
        id: task.id,
        module: task.module_name,
        cmd: task.command,
        status: task.status,
        has_log,
        time: task.created_at.format("%H:%M:%S").to_string(),
        pid: task.pid,
        target: task.target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn target_resolution_priority() {
        assert_eq!(
            resolve_target(&inputs(&[("ip", "10.0.0.1"), ("target", "10.0.0.2")])),
            "10.0.0.2"
        );
        assert_eq!(resolve_target(&inputs(&[("range", "10.0.0.0/24")])), "10.0.0.0/24");
        assert_eq!(resolve_target(&inputs(&[("dc_ip", " 10.0.0.5 ")])), "10.0.0.5");
        assert_eq!(resolve_target(&inputs(&[("target", "  ")])), WORKFLOW_TARGET);
        assert_eq!(resolve_target(&inputs(&[("user", "admin")])), WORKFLOW_TARGET);
    }

    #[test]
    fn running_and_aborted_tasks_refuse_to_advance() {
        assert!(advance_blocked(TaskStatus::Running));
        assert!(advance_blocked(TaskStatus::Aborted));

        assert!(!advance_blocked(TaskStatus::Pending));
        assert!(!advance_blocked(TaskStatus::Parsing));
        assert!(!advance_blocked(TaskStatus::Completed));
        assert!(!advance_blocked(TaskStatus::Hidden));
    }

    #[test]
    fn single_command_module_runs_once_then_finalizes() {
        let module = crate::registry::compile(redops_model::ModuleDefinition {
            id: "whoami".into(),
            name: "Whoami".into(),
            command: Some("whoami".into()),
            steps: None,
            parsing: None,
            checklist_keys: None,
            inputs: None,
        })
        .unwrap();
        let subst = BTreeMap::new();

        match plan_step(&module, 0, &subst) {
            StepPlan::Launch { command, label, unresolved } => {
                assert_eq!(command, "whoami");
                assert_eq!(label, "Execution");
                assert!(unresolved.is_empty());
            }
            other => panic!("expected launch, got {other:?}"),
        }
        assert_eq!(plan_step(&module, 1, &subst), StepPlan::Finalize);
    }

    #[test]
    fn unready_conditions_skip_until_a_runnable_step() {
        let yaml = r#"
id: chain
name: Chain
steps:
  - command: "nxc smb {{range}}"
  - command: "secretsdump {{dc_ip}}"
    condition: "{{dc_ip}}"
  - command: "GetNPUsers {{domain}}/"
    condition: "{{domain}}"
  - command: "echo done"
"#;
        let def: redops_model::ModuleDefinition = serde_yaml::from_str(yaml).unwrap();
        let module = crate::registry::compile(def).unwrap();

        // Step 1 extracted nothing: both conditioned steps are skipped and
        // the unconditioned final step launches.
        let subst = inputs(&[("range", "10.0.0.0/24")]);
        assert!(matches!(plan_step(&module, 0, &subst), StepPlan::Launch { .. }));
        assert_eq!(plan_step(&module, 1, &subst), StepPlan::Skip);
        assert_eq!(plan_step(&module, 2, &subst), StepPlan::Skip);
        match plan_step(&module, 3, &subst) {
            StepPlan::Launch { command, .. } => assert_eq!(command, "echo done"),
            other => panic!("expected launch, got {other:?}"),
        }
        assert_eq!(plan_step(&module, 4, &subst), StepPlan::Finalize);

        // A blank extracted value is not a ready condition either.
        let subst = inputs(&[("range", "10.0.0.0/24"), ("dc_ip", "  ")]);
        assert_eq!(plan_step(&module, 1, &subst), StepPlan::Skip);

        // With the variable filled, the step launches rendered.
        let subst = inputs(&[("dc_ip", "10.0.0.5")]);
        match plan_step(&module, 1, &subst) {
            StepPlan::Launch { command, .. } => {
                assert_eq!(command, "secretsdump 10.0.0.5");
            }
            other => panic!("expected launch, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_command_placeholders_are_reported_not_fatal() {
        let module = crate::registry::compile(redops_model::ModuleDefinition {
            id: "m".into(),
            name: "M".into(),
            command: Some("nmap {{target}} -p {{ports}}".into()),
            steps: None,
            parsing: None,
            checklist_keys: None,
            inputs: None,
        })
        .unwrap();

        match plan_step(&module, 0, &inputs(&[("target", "10.0.0.1")])) {
            StepPlan::Launch { command, unresolved, .. } => {
                assert_eq!(command, "nmap 10.0.0.1 -p {{ports}}");
                assert_eq!(unresolved, vec!["ports".to_string()]);
            }
            other => panic!("expected launch, got {other:?}"),
        }
    }

    #[test]
    fn step_log_takes_precedence_over_stored_content() {
        let live = Some("partial scan output".to_string());
        let stored = Some("older consolidated".to_string());
        assert_eq!(render_output(live, stored), "partial scan output");

        assert_eq!(
            render_output(None, Some("consolidated".into())),
            "consolidated"
        );
        assert_eq!(render_output(Some(String::new()), None), "No output available yet.");
    }

    #[test]
    fn preview_renders_manual_commands() {
        let module = crate::registry::compile(redops_model::ModuleDefinition {
            id: "nmap".into(),
            name: "Nmap".into(),
            command: Some("nmap -sV {{target}}".into()),
            steps: None,
            parsing: None,
            checklist_keys: None,
            inputs: None,
        })
        .unwrap();

        let preview = command_preview(&module, &inputs(&[("target", "10.0.0.1")]));
        assert_eq!(preview, "nmap -sV 10.0.0.1");
    }
}
