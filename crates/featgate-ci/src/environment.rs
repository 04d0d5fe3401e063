//! Platform environment preparation.
//!
//! A platform's setup steps run once, before any of its jobs. The first
//! failing step aborts preparation and every job on that platform is reported
//! with the resulting [`SetupError`].

use std::sync::Arc;

use async_trait::async_trait;
use featgate_core::{Platform, SetupError, SetupStep};
use tracing::{debug, info, warn};

use crate::command::Invocation;
use crate::runner::CommandRunner;

/// Default time limit for a single setup step.
pub const DEFAULT_SETUP_TIMEOUT_SECS: u64 = 600;

/// Prepares a platform so its jobs can run.
#[async_trait]
pub trait Environment: Send + Sync {
    fn platform_id(&self) -> &str;

    async fn prepare(&self) -> Result<(), SetupError>;
}

/// Runs a platform's setup steps as processes, in order.
pub struct CommandEnvironment {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    timeout_secs: u64,
}

impl CommandEnvironment {
    pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            platform,
            runner,
            timeout_secs: DEFAULT_SETUP_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn error(&self, step: &SetupStep, reason: impl Into<String>) -> SetupError {
        SetupError {
            platform: self.platform.id.clone(),
            step: step.name.clone(),
            reason: reason.into(),
        }
    }

    async fn run_step(&self, step: &SetupStep) -> Result<(), SetupError> {
        let invocation = Invocation::from_command(&step.command)
            .ok_or_else(|| self.error(step, "empty command"))?;

        debug!(platform = %self.platform.id, step = %step.name, command = %invocation, "running setup step");

        let output = self
            .runner
            .run(&invocation, self.timeout_secs)
            .await
            .map_err(|e| self.error(step, e.to_string()))?;

        if output.success() {
            return Ok(());
        }

        let detail = output.stderr.trim();
        let reason = if detail.is_empty() {
            format!("exit code {}", output.exit_code)
        } else {
            format!("exit code {}: {}", output.exit_code, last_line(detail))
        };
        Err(self.error(step, reason))
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text).trim()
}

#[async_trait]
impl Environment for CommandEnvironment {
    fn platform_id(&self) -> &str {
        &self.platform.id
    }

    async fn prepare(&self) -> Result<(), SetupError> {
        for step in &self.platform.setup {
            if let Err(err) = self.run_step(step).await {
                warn!(platform = %err.platform, step = %err.step, reason = %err.reason, "setup failed");
                return Err(err);
            }
        }
        info!(platform = %self.platform.id, steps = self.platform.setup.len(), "platform ready");
        Ok(())
    }
}

/// An environment that needs no preparation.
#[derive(Debug, Clone)]
pub struct NoopEnvironment {
    platform_id: String,
}

impl NoopEnvironment {
    pub fn new(platform_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
        }
    }
}

#[async_trait]
impl Environment for NoopEnvironment {
    fn platform_id(&self) -> &str {
        &self.platform_id
    }

    async fn prepare(&self) -> Result<(), SetupError> {
        Ok(())
    }
}

/// The environment for `platform`: process-backed when it declares setup
/// steps, a no-op otherwise. Each setup step gets `timeout_secs`.
pub fn environment_for(
    platform: &Platform,
    runner: Arc<dyn CommandRunner>,
    timeout_secs: u64,
) -> Arc<dyn Environment> {
    if platform.setup.is_empty() {
        Arc::new(NoopEnvironment::new(platform.id.clone()))
    } else {
        Arc::new(CommandEnvironment::new(platform.clone(), runner).with_timeout(timeout_secs))
    }
}
