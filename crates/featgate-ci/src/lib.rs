//! featgate CI - feature-matrix job execution
//!
//! Provides the pipeline that carries out a plan:
//! - Prepares each platform's environment
//! - Executes Cargo jobs (check, fmt, clippy, test) with per-action timeouts
//! - Captures diagnostics and classifies outcomes
//! - Evaluates the gate over the collected results

pub mod command;
pub mod diagnostics;
pub mod environment;
pub mod executor;
pub mod fakes;
pub mod pipeline;
pub mod runner;
pub mod workspace_info;

// Re-export key types
pub use command::{job_invocation, Invocation};
pub use diagnostics::{parse_diagnostics, DiagnosticsConfig};
pub use environment::{environment_for, CommandEnvironment, Environment, NoopEnvironment};
pub use executor::JobExecutor;
pub use pipeline::{CancellationHandle, Pipeline, PipelineError, RunReport};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunnerError};
