//! # Redops Core
//!
//! Engine library for the Redops scan orchestrator: module registry, task
//! lifecycle, sandboxed execution, and the result-extraction pipeline.
//!
//! ## Architecture
//!
//! - [`registry`]: versioned snapshots of YAML module definitions
//! - [`engine`]: task creation, step launching, and demand-driven liveness
//!   reconciliation
//! - [`sandbox`]: command execution inside the pentest container
//! - [`parse`]: turning raw tool output into hosts and vulnerabilities
//! - [`results`]: read-side projections (results tree, host summaries)
//! - [`db`]: Postgres repositories and schema bootstrap
//!
//! Tasks move `pending → running → parsing → completed` (or `hidden` for
//! modules that opt out of results; `aborted` on operator stop). Nothing
//! polls in the background: liveness is reconciled whenever a tab's task
//! list is read.
#![allow(missing_docs)]

pub mod db;
pub mod engine;
pub mod error;
pub mod parse;
pub mod registry;
pub mod results;
pub mod sandbox;
pub mod template;

pub use engine::{TaskEngine, WORKFLOW_TARGET};
pub use error::{EngineError, Result};
pub use parse::ResultParser;
pub use registry::ModuleRegistry;
pub use sandbox::{DockerSandbox, Liveness, Sandbox};
