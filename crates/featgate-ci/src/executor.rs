//! Job execution and outcome classification.
//!
//! [`JobExecutor::execute`] never returns an error: spawn failures, timeouts
//! and non-zero exits are all captured into the job's [`JobResult`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use featgate_core::{
    Action, Diagnostic, DiagnosticSource, Job, JobFailure, JobResult, LintGate, Outcome,
    SetupError, Severity, VerificationPolicy,
};
use tracing::{debug, info, warn};

use crate::command::job_invocation;
use crate::diagnostics::{
    failed_tests, panic_message, parse_diagnostics, unformatted_files, DiagnosticsConfig,
};
use crate::runner::{CommandOutput, CommandRunner, RunnerError};

/// Reported when a failing test run names no failed case.
pub const UNKNOWN_TEST_CASE: &str = "<unknown>";

/// Runs jobs through a [`CommandRunner`].
#[derive(Clone)]
pub struct JobExecutor {
    runner: Arc<dyn CommandRunner>,
    policy: Arc<VerificationPolicy>,
    workspace: PathBuf,
}

impl JobExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        policy: Arc<VerificationPolicy>,
        workspace: PathBuf,
    ) -> Self {
        Self {
            runner,
            policy,
            workspace,
        }
    }

    /// Run `job` and classify its outcome.
    pub async fn execute(&self, job: &Job) -> JobResult {
        let invocation = job_invocation(job, &self.policy, self.workspace.clone());
        let limit_secs = self.policy.timeouts.for_action(job.action);
        let start = Instant::now();

        debug!(job = %job.id, command = %invocation, limit_secs, "executing job");

        let (outcome, diagnostics) = match self.runner.run(&invocation, limit_secs).await {
            Ok(output) => self.classify(job.action, &output),
            Err(RunnerError::Timeout { .. }) => {
                let diag = Diagnostic::new(
                    Severity::Error,
                    format!("{} exceeded its {limit_secs}s limit", job.id),
                    job.action.into(),
                );
                (
                    Outcome::Failure(JobFailure::Timeout { limit_secs }),
                    vec![diag],
                )
            }
            Err(err @ RunnerError::Spawn { .. }) => {
                let reason = err.to_string();
                let diag = Diagnostic::new(Severity::Error, reason.clone(), job.action.into());
                (
                    Outcome::Failure(spawn_failure(job.action, reason)),
                    vec![diag],
                )
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Outcome::Success => info!(job = %job.id, duration_ms, "job passed"),
            Outcome::Failure(failure) => {
                warn!(job = %job.id, duration_ms, failure = %failure, "job failed")
            }
        }

        JobResult::new(job.clone(), outcome, duration_ms, diagnostics)
    }

    fn classify(&self, action: Action, output: &CommandOutput) -> (Outcome, Vec<Diagnostic>) {
        let config = DiagnosticsConfig {
            max_per_job: usize::MAX,
            ..DiagnosticsConfig::default()
        };
        let mut diagnostics = parse_diagnostics(action, output, &config);
        let outcome = classify_output(action, self.policy.lint_gate, output, &diagnostics);
        diagnostics.truncate(self.policy.max_diagnostics_per_job);
        (outcome, diagnostics)
    }
}

/// Every job of a platform whose setup failed, reported without running.
pub fn setup_failures(jobs: &[Job], err: &SetupError) -> Vec<JobResult> {
    jobs.iter()
        .map(|job| {
            let diag = Diagnostic::new(
                Severity::Error,
                format!("setup step '{}' failed: {}", err.step, err.reason),
                DiagnosticSource::Setup,
            );
            JobResult::new(
                job.clone(),
                Outcome::Failure(err.clone().into()),
                0,
                vec![diag],
            )
        })
        .collect()
}

fn spawn_failure(action: Action, reason: String) -> JobFailure {
    match action {
        Action::TypeCheck => JobFailure::TypeCheckError { reason },
        Action::FormatCheck => JobFailure::FormatViolation { files: Vec::new() },
        Action::Lint => JobFailure::LintViolation { count: 0, reason },
        Action::Test => JobFailure::TestFailure {
            case: UNKNOWN_TEST_CASE.to_string(),
            reason,
        },
    }
}

/// Last non-empty stderr line, or the exit code.
fn exit_reason(output: &CommandOutput) -> String {
    output
        .stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit code {}", output.exit_code))
}

fn first_message(diagnostics: &[Diagnostic], min: Severity) -> Option<String> {
    diagnostics
        .iter()
        .find(|d| d.severity >= min)
        .map(|d| match &d.code {
            Some(code) => format!("{code}: {}", d.message),
            None => d.message.clone(),
        })
}

/// Map a finished command to the job outcome for `action`.
pub fn classify_output(
    action: Action,
    lint_gate: LintGate,
    output: &CommandOutput,
    diagnostics: &[Diagnostic],
) -> Outcome {
    match action {
        Action::Lint => {
            let threshold = match lint_gate {
                LintGate::DenyWarnings => Severity::Warning,
                LintGate::DenyErrors => Severity::Error,
            };
            let count = diagnostics.iter().filter(|d| d.severity >= threshold).count();
            if output.success() && count == 0 {
                return Outcome::Success;
            }
            let reason =
                first_message(diagnostics, threshold).unwrap_or_else(|| exit_reason(output));
            Outcome::Failure(JobFailure::LintViolation { count, reason })
        }
        _ if output.success() => Outcome::Success,
        Action::TypeCheck => {
            let reason = first_message(diagnostics, Severity::Error)
                .unwrap_or_else(|| exit_reason(output));
            Outcome::Failure(JobFailure::TypeCheckError { reason })
        }
        Action::FormatCheck => Outcome::Failure(JobFailure::FormatViolation {
            files: unformatted_files(&output.combined()),
        }),
        Action::Test => {
            let text = output.combined();
            let case = failed_tests(&text)
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN_TEST_CASE.to_string());
            let reason = panic_message(&text, &case).unwrap_or_else(|| exit_reason(output));
            Outcome::Failure(JobFailure::TestFailure { case, reason })
        }
    }
}
