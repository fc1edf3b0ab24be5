//! Scan task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::status::TaskStatus;

/// Accumulated key/value map produced by variable extraction across a
/// workflow's steps. It seeds from the creation inputs and is the live
/// substitution source for later step templates and conditions.
pub type StepContext = BTreeMap<String, String>;

/// One unit of orchestrated work, as persisted.
///
/// Exactly one of `log_file` / `result_content` describes where the step
/// output currently lives (log file while a step runs, accumulated content
/// once consolidated), except transiently mid-consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: i32,
    pub tab_id: i32,
    pub module_id: String,
    pub module_name: String,
    /// The shell command currently associated with the task, prefixed with
    /// the step index once a workflow starts running.
    pub command: String,
    pub status: TaskStatus,
    /// OS pid of the in-flight step, when one is running.
    pub pid: Option<i32>,
    /// Path to the active step's log file, cleared on consolidation.
    pub log_file: Option<String>,
    /// Output accumulated across completed steps.
    pub result_content: Option<String>,
    /// IP, CIDR, hostname, or the `"Workflow"` sentinel.
    pub target: String,
    /// Zero-based index of the next step to run; only ever increases.
    pub current_step: i32,
    pub context: StepContext,
    pub created_at: DateTime<Utc>,
}

impl ScanTask {
    /// Fixed separator placed between consolidated step outputs.
    pub const STEP_SEPARATOR: &'static str = "\n\n=========================\n\n";

    /// Append freshly consolidated step output to the accumulated content.
    pub fn merge_output(existing: Option<&str>, step_output: &str) -> String {
        match existing {
            Some(prior) if !prior.is_empty() => {
                format!("{prior}{}{step_output}", Self::STEP_SEPARATOR)
            }
            _ => step_output.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_output_concatenates_with_separator() {
        let merged = ScanTask::merge_output(Some("first"), "second");
        assert_eq!(merged, format!("first{}second", ScanTask::STEP_SEPARATOR));
    }

    #[test]
    fn merge_output_without_prior_content() {
        assert_eq!(ScanTask::merge_output(None, "root\n"), "root\n");
        assert_eq!(ScanTask::merge_output(Some(""), "root\n"), "root\n");
    }
}
