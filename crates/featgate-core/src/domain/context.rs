//! Immutable identity of one verification run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Trigger {
    /// A proposed change.
    PullRequest { number: Option<u64> },

    /// A push to an integration branch.
    Push { branch: String },
}

impl Trigger {
    pub fn push_to_main() -> Self {
        Trigger::Push {
            branch: "main".to_string(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Trigger::PullRequest { number: Some(n) } => format!("pull_request#{n}"),
            Trigger::PullRequest { number: None } => "pull_request".to_string(),
            Trigger::Push { branch } => format!("push:{branch}"),
        }
    }
}

/// Run context passed explicitly into planning instead of read from ambient
/// process state. Concurrent runs of different revisions never share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,

    pub trigger: Trigger,

    /// Commit under test.
    pub git_sha: String,

    /// Active toolchain description (e.g. `rustup show active-toolchain`).
    pub toolchain: String,

    /// Workspace root the jobs run in.
    pub workspace: PathBuf,

    pub created_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(
        trigger: Trigger,
        git_sha: impl Into<String>,
        toolchain: impl Into<String>,
        workspace: PathBuf,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            git_sha: git_sha.into(),
            toolchain: toolchain.into(),
            workspace,
            created_at: Utc::now(),
        }
    }

    /// Short form of the commit SHA for log lines.
    pub fn short_sha(&self) -> &str {
        match self.git_sha.char_indices().nth(12) {
            Some((end, _)) => &self.git_sha[..end],
            None => &self.git_sha,
        }
    }
}
