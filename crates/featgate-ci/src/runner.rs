//! Process execution behind a trait seam.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::command::Invocation;

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Why a process produced no output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("'{program}' timed out after {limit_secs} seconds")]
    Timeout { program: String, limit_secs: u64 },
}

/// Executes invocations. Production uses [`ProcessRunner`]; tests inject
/// scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A zero `timeout_secs` means no limit.
    async fn run(
        &self,
        invocation: &Invocation,
        timeout_secs: u64,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout_secs: u64,
    ) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|e| RunnerError::Spawn {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = if timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    program: invocation.program.clone(),
                    limit_secs: timeout_secs,
                })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|e| RunnerError::Spawn {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
