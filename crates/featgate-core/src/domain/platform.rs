//! Target execution environments and their prerequisite setup.

use serde::{Deserialize, Serialize};

pub const WINDOWS: &str = "windows";
pub const LINUX: &str = "linux";
pub const MACOS: &str = "macos";

/// A named, idempotent prerequisite that must succeed before any job runs on
/// the platform (e.g. installing native libraries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupStep {
    /// Human-readable step name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,
}

impl SetupStep {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

/// A target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Stable identifier: `windows`, `linux` or `macos`.
    pub id: String,

    /// Ordered setup steps.
    #[serde(default)]
    pub setup: Vec<SetupStep>,
}

impl Platform {
    /// A platform with no setup steps.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            setup: Vec::new(),
        }
    }

    /// Append a setup step.
    pub fn with_setup(mut self, step: SetupStep) -> Self {
        self.setup.push(step);
        self
    }
}

/// Platform id of the machine this process runs on.
pub fn host_platform_id() -> &'static str {
    match std::env::consts::OS {
        "windows" => WINDOWS,
        "macos" => MACOS,
        "linux" => LINUX,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_builder_keeps_step_order() {
        let platform = Platform::new(LINUX)
            .with_setup(SetupStep::new("update", vec!["apt-get".into(), "update".into()]))
            .with_setup(SetupStep::new("install", vec!["apt-get".into(), "install".into()]));
        assert_eq!(platform.setup.len(), 2);
        assert_eq!(platform.setup[0].name, "update");
        assert_eq!(platform.setup[1].name, "install");
    }

    #[test]
    fn test_host_platform_id_is_not_empty() {
        assert!(!host_platform_id().is_empty());
    }
}
