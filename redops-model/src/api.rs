//! Request/response types exposed by the HTTP layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::severity::Severity;
use crate::status::TaskStatus;

/// One row of the task list for a tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: i32,
    pub module: String,
    pub cmd: String,
    pub status: TaskStatus,
    /// Whether any output exists yet (live log file or stored content).
    pub has_log: bool,
    /// Creation time formatted `HH:MM:SS`.
    pub time: String,
    pub pid: Option<i32>,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub tab_id: i32,
    pub module_id: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

/// One completed task inside the results tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    pub id: i32,
    pub module: String,
    pub date: String,
    pub has_log: bool,
}

/// Results tree: group key (subnet, CIDR literal, or catch-all bucket) →
/// target → entries, newest first.
pub type ResultsTree = BTreeMap<String, BTreeMap<String, Vec<ResultEntry>>>;

/// Reference to a scan relevant to a host (target equals the host, or a
/// CIDR target containing it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRef {
    pub task_id: i32,
    pub module: String,
    pub date: String,
}

/// Per-host rollup for the host-centric results view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSummary {
    pub ip: String,
    /// Vulnerability counts keyed by canonical severity name.
    pub counts: BTreeMap<String, i64>,
    pub highest: Option<Severity>,
    pub scans: Vec<ScanRef>,
}

/// One vulnerability row in search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnRow {
    pub id: i32,
    pub ip: String,
    pub title: String,
    pub severity: Severity,
    pub module: String,
    pub details: String,
    pub date: String,
}

/// One checklist item with the targets that validated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub key: String,
    pub name: String,
    pub description: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleChecklistRequest {
    pub key: String,
    pub target: String,
    pub is_checked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetVarRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i32,
    pub name: String,
}
