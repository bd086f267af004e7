//! Run generated scripts as isolated, time-bounded child processes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::synthesize::GeneratedScript;

const SCRIPT_FILE: &str = "solver.py";

/// Outcome of running a script. `succeeded` is process-level only: a zero
/// exit status says nothing about whether the answer is right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Stdout followed by stderr.
    pub output: String,
    pub succeeded: bool,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn completed(output: impl Into<String>, succeeded: bool) -> Self {
        Self {
            output: output.into(),
            succeeded,
            timed_out: false,
        }
    }

    /// A run that never produced a process result (spawn or IO fault).
    pub fn fault(message: impl Into<String>) -> Self {
        Self::completed(message, false)
    }

    pub fn timeout(limit: Duration) -> Self {
        Self {
            output: format!("Execution timed out after {}s", limit.as_secs_f32()),
            succeeded: false,
            timed_out: true,
        }
    }
}

/// Runs a script and reports what it printed. Never fails: faults become
/// output text so they can still flow into submission and the logs.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn execute(&self, script: &GeneratedScript) -> ExecutionResult;
}

pub struct SandboxExecutor {
    interpreter: PathBuf,
    timeout: Duration,
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    async fn run(&self, script: &GeneratedScript) -> std::io::Result<ExecutionResult> {
        // Per-run directory so concurrent agents never clobber each other.
        let workdir = tempfile::Builder::new()
            .prefix("agentic-solver-run-")
            .tempdir()?;
        let path = workdir.path().join(SCRIPT_FILE);
        tokio::fs::write(&path, &script.source).await?;

        let child = Command::new(&self.interpreter)
            .arg(&path)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !combined.is_empty() && !combined.ends_with('\n') {
                        combined.push('\n');
                    }
                    combined.push_str(&stderr);
                }
                info!(
                    exit_code = output.status.code(),
                    bytes = combined.len(),
                    "script finished"
                );
                Ok(ExecutionResult::completed(combined, output.status.success()))
            }
            // Dropping the wait future drops the child, which kills it.
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "script timed out, killed");
                Ok(ExecutionResult::timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl ScriptRunner for SandboxExecutor {
    async fn execute(&self, script: &GeneratedScript) -> ExecutionResult {
        match self.run(script).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    interpreter = %self.interpreter.display(),
                    error = %e,
                    "script could not run"
                );
                ExecutionResult::fault(format!(
                    "Failed to run script with {}: {e}",
                    self.interpreter.display()
                ))
            }
        }
    }
}
