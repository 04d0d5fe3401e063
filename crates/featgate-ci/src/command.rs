//! Cargo invocations for each verification action.

use std::fmt;
use std::path::PathBuf;

use featgate_core::{Action, FeatureSet, Job, LintGate, VerificationPolicy};
use serde::{Deserialize, Serialize};

/// A fully-resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Executable.
    pub program: String,

    pub args: Vec<String>,

    /// Working directory; inherits the current one when `None`.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    /// Build from a command vector (first element is the executable).
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn in_dir(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn feature_args(set: &FeatureSet) -> Vec<String> {
    if set.is_empty() {
        Vec::new()
    } else {
        vec!["--features".to_string(), set.to_flag_value()]
    }
}

/// Arguments for `action` with `features`, before policy extras.
pub fn action_args(action: Action, features: &FeatureSet, lint_gate: LintGate) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match action {
        Action::TypeCheck => {
            args.extend(["check", "--workspace"].map(String::from));
            args.extend(feature_args(features));
        }
        Action::FormatCheck => {
            args.extend(["fmt", "--all", "--", "--check"].map(String::from));
        }
        Action::Lint => {
            args.extend(["clippy", "--workspace", "--all-targets"].map(String::from));
            args.extend(feature_args(features));
            if lint_gate == LintGate::DenyWarnings {
                args.extend(["--", "-D", "warnings"].map(String::from));
            }
        }
        Action::Test => {
            args.extend(["test", "--workspace"].map(String::from));
            args.extend(feature_args(features));
        }
    }
    args
}

/// The cargo invocation that verifies `job` under `policy`.
///
/// Policy `extra_args` are inserted before any `--` separator so they reach
/// cargo rather than the tool it wraps.
pub fn job_invocation(job: &Job, policy: &VerificationPolicy, workspace: PathBuf) -> Invocation {
    let mut args = action_args(job.action, &job.feature_set, policy.lint_gate);
    if !policy.extra_args.is_empty() {
        let split = args.iter().position(|a| a == "--").unwrap_or(args.len());
        let tail = args.split_off(split);
        args.extend(policy.extra_args.iter().cloned());
        args.extend(tail);
    }
    Invocation::new(policy.cargo.clone(), args).in_dir(workspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maximal() -> FeatureSet {
        FeatureSet::parse("lua54,rhai,teal,lua_script_api,rhai_script_api")
    }

    #[test]
    fn test_check_args() {
        let args = action_args(Action::TypeCheck, &maximal(), LintGate::DenyWarnings);
        assert_eq!(args[0], "check");
        assert!(args.contains(&"--workspace".to_string()));
        assert!(args.contains(&"--features".to_string()));
        assert!(args.contains(&"lua54,lua_script_api,rhai,rhai_script_api,teal".to_string()));
    }

    #[test]
    fn test_fmt_ignores_features() {
        let args = action_args(Action::FormatCheck, &maximal(), LintGate::DenyWarnings);
        assert_eq!(args, vec!["fmt", "--all", "--", "--check"]);
    }

    #[test]
    fn test_clippy_deny_warnings() {
        let args = action_args(Action::Lint, &maximal(), LintGate::DenyWarnings);
        assert_eq!(&args[args.len() - 3..], &["--", "-D", "warnings"]);

        let args = action_args(Action::Lint, &maximal(), LintGate::DenyErrors);
        assert!(!args.contains(&"-D".to_string()));
    }

    #[test]
    fn test_empty_feature_set_omits_flag() {
        let args = action_args(Action::Test, &FeatureSet::empty(), LintGate::DenyWarnings);
        assert_eq!(args, vec!["test", "--workspace"]);
    }

    #[test]
    fn test_extra_args_before_separator() {
        let policy = VerificationPolicy {
            extra_args: vec!["--locked".to_string()],
            ..VerificationPolicy::default()
        };
        let job = Job::new("linux", FeatureSet::parse("rhai"), Action::Lint);
        let inv = job_invocation(&job, &policy, PathBuf::from("/work"));

        assert_eq!(inv.program, "cargo");
        assert_eq!(inv.cwd, Some(PathBuf::from("/work")));
        let locked = inv.args.iter().position(|a| a == "--locked").unwrap();
        let sep = inv.args.iter().position(|a| a == "--").unwrap();
        assert!(locked < sep);
        assert_eq!(
            inv.to_string(),
            "cargo clippy --workspace --all-targets --features rhai --locked -- -D warnings"
        );
    }

    #[test]
    fn test_from_command() {
        let inv = Invocation::from_command(&["apt-get".to_string(), "update".to_string()]).unwrap();
        assert_eq!(inv.program, "apt-get");
        assert_eq!(inv.args, vec!["update"]);
        assert!(Invocation::from_command(&[]).is_none());
    }
}
