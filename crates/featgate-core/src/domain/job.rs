//! Verification actions and the jobs that apply them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::feature::FeatureSet;

/// Id suffix of a job built with no optional features.
pub const DEFAULT_SET_SUFFIX: &str = "[default]";

/// What a job verifies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// cargo check
    TypeCheck,

    /// cargo fmt -- --check
    FormatCheck,

    /// cargo clippy
    Lint,

    /// cargo test
    Test,
}

impl Action {
    /// All actions in plan order.
    pub const ALL: [Action; 4] = [
        Action::TypeCheck,
        Action::FormatCheck,
        Action::Lint,
        Action::Test,
    ];

    /// Job name reported to the surrounding workflow.
    pub fn job_name(&self) -> &'static str {
        match self {
            Action::TypeCheck => "check",
            Action::FormatCheck => "fmt",
            Action::Lint => "clippy",
            Action::Test => "tests",
        }
    }

    /// Whether the action runs on every platform or on the canonical one only.
    pub fn is_cross_platform(&self) -> bool {
        matches!(self, Action::TypeCheck | Action::Test)
    }

    /// Parse a job name (`check`, `fmt`, `clippy`, `tests`).
    pub fn from_job_name(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.job_name() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.job_name())
    }
}

/// The unit of execution and of pass/fail reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id within a plan, e.g. `"check/linux"`.
    pub id: String,

    /// Platform id the job runs on.
    pub platform: String,

    /// Features compiled into the build.
    pub feature_set: FeatureSet,

    pub action: Action,
}

impl Job {
    pub fn new(platform: impl Into<String>, feature_set: FeatureSet, action: Action) -> Self {
        let platform = platform.into();
        Self {
            id: format!("{}/{}", action.job_name(), platform),
            platform,
            feature_set,
            action,
        }
    }

    /// A job whose id also names its feature set, for jobs that share an
    /// action and platform with another job in the same plan. The empty set
    /// renders as [`DEFAULT_SET_SUFFIX`], which no valid feature name matches.
    pub fn with_feature_suffix(
        platform: impl Into<String>,
        feature_set: FeatureSet,
        action: Action,
    ) -> Self {
        let mut job = Self::new(platform, feature_set, action);
        let suffix = if job.feature_set.is_empty() {
            DEFAULT_SET_SUFFIX.to_string()
        } else {
            job.feature_set.to_flag_value()
        };
        job.id = format!("{}/{}", job.id, suffix);
        job
    }

    pub fn job_name(&self) -> &'static str {
        self.action.job_name()
    }
}
