//! featgate core library
//!
//! Domain model and pure logic for feature-matrix build verification:
//! - Feature and platform registries
//! - Verification policy and the TOML policy file
//! - Deterministic job planning
//! - Gate evaluation over job results

pub mod domain;
pub mod gate;
pub mod planner;
pub mod policy;
pub mod registry;
pub mod telemetry;

pub use domain::{
    host_platform_id, Action, ConfigError, Diagnostic, DiagnosticSource, Feature, FeatureSet,
    Job, JobFailure, JobResult, Outcome, Platform, PlanError, RegistryError, RunContext,
    SetupError, SetupStep, Severity, Trigger,
};
pub use gate::{BlockedJob, GateDecision, GateEvaluator, GateReport};
pub use planner::{JobPlanner, Plan};
pub use policy::{Coverage, LintGate, PolicyFile, Timeouts, VerificationPolicy};
pub use registry::{FeatureRegistry, PlatformRegistry};
pub use telemetry::init_tracing;
