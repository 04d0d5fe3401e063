//! Job outcomes and results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::Diagnostic;
use crate::domain::error::SetupError;
use crate::domain::job::Job;

/// Why a job failed. Attached to its [`JobResult`], never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The platform's setup failed; the job was never attempted.
    SetupError {
        platform: String,
        step: String,
        reason: String,
    },

    /// The workspace does not compile under the job's feature set.
    TypeCheckError { reason: String },

    /// Canonical formatting would change these files.
    FormatViolation { files: Vec<String> },

    /// Lint diagnostics at or above the configured severity.
    LintViolation { count: usize, reason: String },

    /// A test case failed or panicked.
    TestFailure { case: String, reason: String },

    /// The job did not finish within its time limit.
    Timeout { limit_secs: u64 },

    /// No result was reported for a planned job.
    Incomplete,
}

impl From<SetupError> for JobFailure {
    fn from(err: SetupError) -> Self {
        JobFailure::SetupError {
            platform: err.platform,
            step: err.step,
            reason: err.reason,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::SetupError {
                platform,
                step,
                reason,
            } => write!(f, "setup step '{step}' failed on {platform}: {reason}"),
            JobFailure::TypeCheckError { reason } => write!(f, "type check failed: {reason}"),
            JobFailure::FormatViolation { files } if files.is_empty() => {
                write!(f, "formatting differs from canonical style")
            }
            JobFailure::FormatViolation { files } => {
                write!(f, "formatting differs in: {}", files.join(", "))
            }
            JobFailure::LintViolation { count, reason } => {
                write!(f, "{count} lint diagnostic(s): {reason}")
            }
            JobFailure::TestFailure { case, reason } => {
                write!(f, "test '{case}' failed: {reason}")
            }
            JobFailure::Timeout { limit_secs } => write!(f, "timed out after {limit_secs}s"),
            JobFailure::Incomplete => write!(f, "no result reported"),
        }
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(JobFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(f) => Some(f),
        }
    }
}

/// Result of a finished job. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job: Job,

    pub outcome: Outcome,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Diagnostics captured from the job's output.
    pub diagnostics: Vec<Diagnostic>,

    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn new(job: Job, outcome: Outcome, duration_ms: u64, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            job,
            outcome,
            duration_ms,
            diagnostics,
            finished_at: Utc::now(),
        }
    }

    pub fn success(job: Job, duration_ms: u64) -> Self {
        Self::new(job, Outcome::Success, duration_ms, Vec::new())
    }

    pub fn failure(job: Job, failure: JobFailure, duration_ms: u64) -> Self {
        Self::new(job, Outcome::Failure(failure), duration_ms, Vec::new())
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_success()
    }
}
