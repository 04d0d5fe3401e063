//! Domain model for feature-matrix verification.
//!
//! - `Feature` / `FeatureSet`: optional capabilities and validated combinations
//! - `Platform` / `SetupStep`: target environments and their prerequisites
//! - `Job` / `Action`: the unit of execution
//! - `JobResult` / `Outcome` / `JobFailure`: what a job produced
//! - `RunContext`: immutable identity of one run

pub mod context;
pub mod diagnostic;
pub mod error;
pub mod feature;
pub mod job;
pub mod platform;
pub mod result;

pub use context::{RunContext, Trigger};
pub use diagnostic::{Diagnostic, DiagnosticSource, Severity};
pub use error::{
    ConfigError, PlanError, PlanResult, RegistryError, RegistryResult, SetupError,
};
pub use feature::{Feature, FeatureSet};
pub use job::{Action, Job, DEFAULT_SET_SUFFIX};
pub use platform::{host_platform_id, Platform, SetupStep};
pub use result::{JobFailure, JobResult, Outcome};
