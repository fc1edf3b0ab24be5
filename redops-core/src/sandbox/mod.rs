//! Sandboxed command execution.
//!
//! Scan commands never run on the host: they are executed inside a
//! long-lived pentest container with the operator's interactive profile
//! sourced and the global variable store exported into the environment.
//! Launches are fire-and-forget — the runner records the pid and returns,
//! and completion is only observed later by the liveness reconciler.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Result of a non-blocking liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

/// Execution environment for scan commands.
///
/// Implementations must not block on the launched process; completion is
/// detected through [`probe`](Sandbox::probe).
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `command` in the sandbox, streaming merged stdout+stderr to
    /// `log_path` (appending below `banner`), and return the pid of the
    /// launched process without waiting on it.
    async fn launch(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
        log_path: &Path,
        banner: &str,
    ) -> Result<i32>;

    /// Best-effort termination signal. Failures (already-dead process,
    /// unknown pid) are not errors.
    async fn terminate(&self, pid: i32);

    /// Non-blocking liveness check with reap-if-exited semantics.
    async fn probe(&self, pid: i32) -> Liveness;
}

/// Sandbox backed by `docker exec` against a pentest container.
///
/// Children spawned by this process are tracked so liveness can use a
/// non-blocking `try_wait` (which also reaps the zombie). A pid that is not
/// a tracked child — the server restarted underneath a running scan — falls
/// back to a `kill -0` probe.
#[derive(Debug)]
pub struct DockerSandbox {
    container: String,
    workdir: String,
    children: DashMap<i32, Child>,
}

impl DockerSandbox {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            workdir: "/workspace".to_string(),
            children: DashMap::new(),
        }
    }

    fn shell_script(&self, command: &str, env: &BTreeMap<String, String>) -> String {
        let mut exports = String::new();
        for (key, value) in env {
            let safe = value.replace('\\', "\\\\").replace('"', "\\\"");
            exports.push_str(&format!("export {key}=\"{safe}\"; "));
        }
        format!("source ~/.zshrc && {exports}{command}")
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn launch(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
        log_path: &Path,
        banner: &str,
    ) -> Result<i32> {
        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        log.write_all(banner.as_bytes())?;
        log.flush()?;

        let stdout = log.try_clone()?;
        let stderr = log.try_clone()?;

        let child = Command::new("docker")
            .arg("exec")
            .arg("-w")
            .arg(&self.workdir)
            .arg(&self.container)
            .arg("zsh")
            .arg("-c")
            .arg(self.shell_script(command, env))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;

        let pid = child.id().ok_or_else(|| {
            EngineError::Internal("spawned process exited before pid capture".into())
        })? as i32;

        debug!(pid, %command, "launched sandbox command");
        self.children.insert(pid, child);
        Ok(pid)
    }

    async fn terminate(&self, pid: i32) {
        if let Some(mut child) = self.children.get_mut(&pid) {
            if let Err(err) = child.start_kill() {
                debug!(pid, %err, "kill on tracked child failed (likely already dead)");
            }
            return;
        }

        // Not our child: signal through the host.
        match Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await
        {
            Ok(status) if !status.success() => {
                debug!(pid, "kill -TERM reported failure (process likely gone)");
            }
            Err(err) => warn!(pid, %err, "failed to invoke kill"),
            _ => {}
        }
    }

    async fn probe(&self, pid: i32) -> Liveness {
        if let Some(mut child) = self.children.get_mut(&pid) {
            return match child.try_wait() {
                Ok(None) => Liveness::Alive,
                Ok(Some(status)) => {
                    debug!(pid, ?status, "sandbox command exited");
                    drop(child);
                    self.children.remove(&pid);
                    Liveness::Dead
                }
                Err(err) => {
                    warn!(pid, %err, "try_wait failed, treating as dead");
                    drop(child);
                    self.children.remove(&pid);
                    Liveness::Dead
                }
            };
        }

        // kill -0 probe for processes we did not spawn ourselves.
        match Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .status()
            .await
        {
            Ok(status) if status.success() => Liveness::Alive,
            _ => Liveness::Dead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_script_exports_vars_before_command() {
        let sandbox = DockerSandbox::new("pentest-lab");
        let mut env = BTreeMap::new();
        env.insert("DOMAIN".to_string(), "corp.local".to_string());
        env.insert("PASS".to_string(), "p\"w".to_string());

        let script = sandbox.shell_script("nxc smb 10.0.0.0/24", &env);
        assert!(script.starts_with("source ~/.zshrc && "));
        assert!(script.contains("export DOMAIN=\"corp.local\"; "));
        assert!(script.contains("export PASS=\"p\\\"w\"; "));
        assert!(script.ends_with("nxc smb 10.0.0.0/24"));
    }
}
