//! Core data model definitions shared across Redops crates.
#![allow(missing_docs)]

pub mod api;
pub mod checklist;
pub mod finding;
pub mod module;
pub mod severity;
pub mod status;
pub mod task;

// Intentionally curated re-exports for downstream consumers.
pub use api::{
    ChecklistEntry, CreateTaskRequest, HostSummary, ResultEntry, ResultsTree,
    ScanRef, SetVarRequest, TabInfo, TaskSummary, ToggleChecklistRequest,
    VulnRow,
};
pub use checklist::{ChecklistDefinition, ChecklistStatus};
pub use finding::{Finding, GlobalVar, Host, Vulnerability};
pub use module::{
    JsonRule, ModuleDefinition, ParsingDef, StepDef, TextRule,
    DEFAULT_IP_PATTERN,
};
pub use severity::Severity;
pub use status::TaskStatus;
pub use task::{ScanTask, StepContext};
