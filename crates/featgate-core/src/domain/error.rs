//! Error taxonomy for registries, planning and configuration.

use thiserror::Error;

/// Errors produced while building the feature and platform registries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("feature already registered: {name}")]
    DuplicateFeature { name: String },

    /// Feature names are limited to the characters cargo accepts.
    #[error("invalid feature name '{name}': {reason}")]
    InvalidFeatureName { name: String, reason: String },

    #[error("platform already registered: {id}")]
    DuplicatePlatform { id: String },

    /// A `requires` or `conflicts` entry names a feature that was never registered.
    #[error("feature '{feature}' references unknown feature '{referenced}'")]
    UnknownFeature { feature: String, referenced: String },

    #[error("feature dependency cycle detected involving: {features:?}")]
    DependencyCycle { features: Vec<String> },
}

/// Errors that abort plan construction before any job runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid feature set [{set}]: {reason}")]
    InvalidFeatureSet { set: String, reason: String },

    #[error("platform not registered: {id}")]
    UnknownPlatform { id: String },

    #[error("no platforms registered")]
    NoPlatforms,

    #[error("job id planned twice: {id}")]
    DuplicateJobId { id: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors produced while loading a policy file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// A platform prerequisite step failed; every job on the platform is failed with it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("setup step '{step}' failed on {platform}: {reason}")]
pub struct SetupError {
    pub platform: String,
    pub step: String,
    pub reason: String,
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type for planning operations.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_feature_set_display() {
        let err = PlanError::InvalidFeatureSet {
            set: "lua54,teal".to_string(),
            reason: "unknown feature 'teal'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lua54,teal"));
        assert!(msg.contains("unknown feature"));
    }

    #[test]
    fn test_registry_error_converts_into_plan_error() {
        let err: PlanError = RegistryError::DependencyCycle {
            features: vec!["a".to_string(), "b".to_string()],
        }
        .into();
        assert!(matches!(err, PlanError::Registry(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_setup_error_display() {
        let err = SetupError {
            platform: "linux".to_string(),
            step: "install native libs".to_string(),
            reason: "exit code 100".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("linux"));
        assert!(msg.contains("install native libs"));
        assert!(msg.contains("exit code 100"));
    }
}
