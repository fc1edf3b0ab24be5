//! Request handlers, grouped by resource.

pub mod checklist;
pub mod modules;
pub mod results;
pub mod tabs;
pub mod tasks;
pub mod vars;
pub mod vulns;
