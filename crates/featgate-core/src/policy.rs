//! Verification policy and the TOML policy file.
//!
//! A policy file declares features, platforms and the policy that turns them
//! into a plan:
//!
//! ```toml
//! [policy]
//! canonical_platform = "linux"
//! maximal_features = "lua54,rhai,teal,lua_script_api,rhai_script_api"
//! lint_gate = "deny-warnings"
//! coverage = "maximal"
//!
//! [policy.timeouts]
//! tests = 1200
//! setup = 600
//!
//! [[feature]]
//! name = "teal"
//! requires = ["lua54"]
//!
//! [[platform]]
//! id = "linux"
//!
//! [[platform.setup]]
//! name = "install native libraries"
//! command = ["sudo", "apt-get", "install", "-y", "libasound2-dev"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::feature::{Feature, FeatureSet};
use crate::domain::job::Action;
use crate::domain::platform::{Platform, SetupStep, LINUX, MACOS, WINDOWS};
use crate::registry::{FeatureRegistry, PlatformRegistry};

/// Features of the built-in policy, in manifest order.
pub const BUILTIN_FEATURES: &str = "lua54,rhai,teal,lua_script_api,rhai_script_api";

/// Which diagnostics fail a lint job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LintGate {
    /// Warnings are promoted to errors (`-D warnings`).
    #[default]
    DenyWarnings,

    /// Only errors fail the job.
    DenyErrors,
}

/// Which feature combinations get verified.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Coverage {
    /// One maximal feature set per action.
    #[default]
    Maximal,

    /// Maximal, plus one type-check per feature with only its requirements
    /// enabled, on the canonical platform.
    EachFeature,
}

/// Per-action time limits in seconds. Zero disables the limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub check: u64,
    pub fmt: u64,
    pub clippy: u64,
    pub tests: u64,
    /// Limit for each platform setup step.
    pub setup: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            check: 300,
            fmt: 300,
            clippy: 600,
            tests: 1200,
            setup: 600,
        }
    }
}

impl Timeouts {
    pub fn for_action(&self, action: Action) -> u64 {
        match action {
            Action::TypeCheck => self.check,
            Action::FormatCheck => self.fmt,
            Action::Lint => self.clippy,
            Action::Test => self.tests,
        }
    }
}

/// Operator-supplied policy for turning registries into a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationPolicy {
    /// Platform that runs the platform-independent actions (fmt, clippy).
    pub canonical_platform: String,

    /// Feature set used by every action. `None` selects every registered feature.
    pub maximal_features: Option<FeatureSet>,

    /// Overrides the registry's default (empty) feature set.
    pub default_features: Option<FeatureSet>,

    pub lint_gate: LintGate,

    pub coverage: Coverage,

    /// Upper bound on jobs executing at once across all platforms.
    pub max_concurrent_jobs: usize,

    /// Cargo executable.
    pub cargo: String,

    /// Extra arguments appended to every cargo invocation before `--`.
    pub extra_args: Vec<String>,

    /// Diagnostics kept per job; the rest are dropped.
    pub max_diagnostics_per_job: usize,

    pub timeouts: Timeouts,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            canonical_platform: LINUX.to_string(),
            maximal_features: None,
            default_features: None,
            lint_gate: LintGate::default(),
            coverage: Coverage::default(),
            max_concurrent_jobs: 4,
            cargo: "cargo".to_string(),
            extra_args: Vec::new(),
            max_diagnostics_per_job: 100,
            timeouts: Timeouts::default(),
        }
    }
}

impl VerificationPolicy {
    /// The maximal feature set, resolved against the registry.
    pub fn maximal_feature_set(&self, features: &FeatureRegistry) -> FeatureSet {
        self.maximal_features
            .clone()
            .unwrap_or_else(|| features.maximal_feature_set())
    }
}

/// Contents of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyFile {
    #[serde(default)]
    pub policy: VerificationPolicy,

    #[serde(default, rename = "feature")]
    pub features: Vec<Feature>,

    #[serde(default, rename = "platform")]
    pub platforms: Vec<Platform>,
}

impl PolicyFile {
    /// The supplied manifest: five scripting features on three platforms,
    /// with native audio/input libraries installed on linux.
    pub fn builtin() -> Self {
        let features = vec![
            Feature::new("lua54"),
            Feature::new("rhai"),
            Feature::new("teal").requires("lua54"),
            Feature::new("lua_script_api").requires("lua54"),
            Feature::new("rhai_script_api").requires("rhai"),
        ];

        let linux = Platform::new(LINUX)
            .with_setup(SetupStep::new(
                "update package index",
                ["sudo", "apt-get", "update"].map(String::from).to_vec(),
            ))
            .with_setup(SetupStep::new(
                "install native audio/input libraries",
                [
                    "sudo",
                    "apt-get",
                    "install",
                    "-y",
                    "--no-install-recommends",
                    "libasound2-dev",
                    "libudev-dev",
                ]
                .map(String::from)
                .to_vec(),
            ));

        let policy = VerificationPolicy {
            maximal_features: Some(FeatureSet::parse(BUILTIN_FEATURES)),
            ..VerificationPolicy::default()
        };

        Self {
            policy,
            features,
            platforms: vec![Platform::new(WINDOWS), linux, Platform::new(MACOS)],
        }
    }

    /// Parse a policy file from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: PolicyFile = toml::from_str(text)?;
        file.check()?;
        Ok(file)
    }

    /// Read and parse a policy file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML (used by `featgate validate --print`).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.policy.canonical_platform.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "canonical_platform cannot be empty".to_string(),
            ));
        }
        if self.policy.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be > 0".to_string(),
            ));
        }
        if self.policy.cargo.trim().is_empty() {
            return Err(ConfigError::Invalid("cargo cannot be empty".to_string()));
        }
        for platform in &self.platforms {
            if let Some(step) = platform.setup.iter().find(|s| s.command.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "setup step '{}' on {} has an empty command",
                    step.name, platform.id
                )));
            }
        }
        Ok(())
    }

    /// Build the feature and platform registries declared by this file.
    pub fn to_registries(&self) -> Result<(FeatureRegistry, PlatformRegistry), ConfigError> {
        let mut features = FeatureRegistry::new();
        for feature in &self.features {
            features.register(feature.clone())?;
        }
        if let Some(default_set) = &self.policy.default_features {
            features.set_default_feature_set(default_set.clone());
        }

        let mut platforms = PlatformRegistry::new();
        for platform in &self.platforms {
            platforms.register(platform.clone())?;
        }

        Ok((features, platforms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_matches_manifest() {
        let file = PolicyFile::builtin();
        assert_eq!(file.policy.canonical_platform, "linux");
        assert_eq!(file.policy.lint_gate, LintGate::DenyWarnings);
        assert_eq!(file.policy.coverage, Coverage::Maximal);
        assert_eq!(
            file.policy.maximal_features,
            Some(FeatureSet::parse(BUILTIN_FEATURES))
        );

        let (features, platforms) = file.to_registries().expect("registries");
        assert_eq!(features.len(), 5);
        assert_eq!(platforms.len(), 3);
        assert!(features.check_graph().is_ok());
        assert_eq!(platforms.get("linux").map(|p| p.setup.len()), Some(2));
        assert_eq!(platforms.get("windows").map(|p| p.setup.len()), Some(0));
    }

    #[test]
    fn test_timeouts_per_action() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.for_action(Action::TypeCheck), 300);
        assert_eq!(timeouts.for_action(Action::Lint), 600);
        assert_eq!(timeouts.for_action(Action::Test), 1200);
        assert_eq!(timeouts.setup, 600);
    }

    #[test]
    fn test_parse_setup_timeout() {
        let file = PolicyFile::from_toml_str(
            r#"
            [policy.timeouts]
            setup = 900

            [[platform]]
            id = "linux"
            "#,
        )
        .expect("parse");

        assert_eq!(file.policy.timeouts.setup, 900);
        assert_eq!(file.policy.timeouts.tests, 1200);
    }

    #[test]
    fn test_parse_minimal_file_uses_defaults() {
        let file = PolicyFile::from_toml_str(
            r#"
            [[feature]]
            name = "serde"

            [[platform]]
            id = "linux"
            "#,
        )
        .expect("parse");

        assert_eq!(file.policy.max_concurrent_jobs, 4);
        assert_eq!(file.policy.timeouts, Timeouts::default());
        assert_eq!(file.features.len(), 1);
        assert_eq!(file.platforms[0].id, "linux");
    }

    #[test]
    fn test_parse_full_file() {
        let file = PolicyFile::from_toml_str(
            r#"
            [policy]
            canonical_platform = "macos"
            maximal_features = "lua54,teal"
            lint_gate = "deny-errors"
            coverage = "each-feature"
            max_concurrent_jobs = 2

            [policy.timeouts]
            tests = 30

            [[feature]]
            name = "lua54"

            [[feature]]
            name = "teal"
            requires = ["lua54"]

            [[platform]]
            id = "macos"

            [[platform.setup]]
            name = "brew"
            command = ["brew", "install", "lua"]
            "#,
        )
        .expect("parse");

        assert_eq!(file.policy.canonical_platform, "macos");
        assert_eq!(file.policy.lint_gate, LintGate::DenyErrors);
        assert_eq!(file.policy.coverage, Coverage::EachFeature);
        assert_eq!(file.policy.timeouts.tests, 30);
        assert_eq!(file.policy.timeouts.check, 300);
        assert_eq!(file.platforms[0].setup[0].command[0], "brew");
        assert!(file.features[1].requires.contains("lua54"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = PolicyFile::from_toml_str(
            r#"
            [policy]
            max_concurrent_jobs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_duplicate_feature_in_file() {
        let file = PolicyFile::from_toml_str(
            r#"
            [[feature]]
            name = "rhai"

            [[feature]]
            name = "rhai"
            "#,
        )
        .expect("parse");
        assert!(matches!(
            file.to_registries(),
            Err(ConfigError::Registry(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("featgate.toml");
        std::fs::write(&path, PolicyFile::builtin().to_toml_string().expect("toml"))
            .expect("write");

        let loaded = PolicyFile::load(&path).expect("load");
        assert_eq!(loaded, PolicyFile::builtin());
    }

    #[test]
    fn test_load_missing_file() {
        let err = PolicyFile::load(Path::new("/nonexistent/featgate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_maximal_none_selects_all_registered() {
        let mut policy = VerificationPolicy::default();
        policy.maximal_features = None;
        let mut features = FeatureRegistry::new();
        features.register(Feature::new("a")).unwrap();
        features.register(Feature::new("b")).unwrap();
        assert_eq!(policy.maximal_feature_set(&features).to_flag_value(), "a,b");
    }
}
