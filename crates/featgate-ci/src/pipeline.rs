//! Pipeline orchestration: platform setup, concurrent platforms and gating.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use featgate_core::{
    GateEvaluator, GateReport, Job, JobResult, Plan, PlanError, PlatformRegistry,
    VerificationPolicy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::environment::{environment_for, Environment};
use crate::executor::{setup_failures, JobExecutor};
use crate::runner::CommandRunner;

/// Errors that abort a whole run. Job-level failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("run {run_id} was cancelled")]
    Cancelled { run_id: Uuid },

    #[error("platform task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Cancels every run of the pipeline it was taken from.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the handle is cancelled; never resolves otherwise.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Outcome of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,

    /// Digest of the executed plan.
    pub plan_digest: String,

    /// One result per completed job, in plan order. Jobs that panicked have
    /// none and the gate reports them as incomplete.
    pub results: Vec<JobResult>,

    pub gate: GateReport,

    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_pass(&self) -> bool {
        self.gate.decision.is_pass()
    }

    /// Number of jobs that passed.
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    /// Number of jobs that failed.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed()).count()
    }
}

/// Executes plans.
///
/// Each platform gets one task that prepares its environment and then runs
/// its jobs one at a time, since cargo invocations in one workspace wait on
/// the same build directory lock. Platforms run concurrently and share a
/// semaphore bounded by `max_concurrent_jobs`.
///
/// A job that panics leaves no result and is reported as incomplete. A panic
/// during platform setup does the same for every job on that platform. Other
/// jobs and platforms are unaffected.
pub struct Pipeline {
    policy: Arc<VerificationPolicy>,
    default_runner: Arc<dyn CommandRunner>,
    platform_runners: BTreeMap<String, Arc<dyn CommandRunner>>,
    cancellation: CancellationHandle,
}

impl Pipeline {
    pub fn new(policy: VerificationPolicy, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            policy: Arc::new(policy),
            default_runner: runner,
            platform_runners: BTreeMap::new(),
            cancellation: CancellationHandle::new(),
        }
    }

    /// Use `runner` for setup and jobs on `platform` instead of the default.
    pub fn with_platform_runner(
        mut self,
        platform: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        self.platform_runners.insert(platform.into(), runner);
        self
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    fn runner_for(&self, platform: &str) -> Arc<dyn CommandRunner> {
        self.platform_runners
            .get(platform)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_runner))
    }

    /// Execute every job in `plan` and evaluate the gate.
    ///
    /// Returns [`PipelineError::Cancelled`] if the handle is cancelled before
    /// the run completes; partial results are discarded.
    #[instrument(skip_all, fields(run_id = %plan.context().run_id, digest = %plan.digest()))]
    pub async fn run(&self, plan: &Plan, platforms: &PlatformRegistry) -> Result<RunReport> {
        let run_id = plan.context().run_id;
        let started_at = Utc::now();
        let start = Instant::now();

        let mut cancel_rx = self.cancellation.subscribe();
        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled { run_id });
        }

        info!(
            jobs = plan.len(),
            trigger = %plan.context().trigger.label(),
            sha = %plan.context().short_sha(),
            "starting pipeline"
        );

        let semaphore = Arc::new(Semaphore::new(self.policy.max_concurrent_jobs.max(1)));
        let workspace = plan.context().workspace.clone();
        let mut join_set = JoinSet::new();
        let mut task_platforms = HashMap::new();

        for platform_id in plan.platforms() {
            let platform = platforms
                .get(platform_id)
                .ok_or_else(|| PlanError::UnknownPlatform {
                    id: platform_id.to_string(),
                })?;

            let jobs: Vec<(usize, Job)> = plan
                .jobs()
                .iter()
                .enumerate()
                .filter(|(_, job)| job.platform == platform_id)
                .map(|(idx, job)| (idx, job.clone()))
                .collect();

            let runner = self.runner_for(platform_id);
            let environment =
                environment_for(platform, Arc::clone(&runner), self.policy.timeouts.setup);
            let executor = JobExecutor::new(runner, Arc::clone(&self.policy), workspace.clone());
            let semaphore = Arc::clone(&semaphore);

            let task = join_set.spawn(run_platform(environment, executor, jobs, semaphore));
            task_platforms.insert(task.id(), platform_id.to_string());
        }

        let mut slots: Vec<Option<JobResult>> = vec![None; plan.len()];
        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => {
                    join_set.abort_all();
                    warn!("pipeline cancelled, discarding partial results");
                    return Err(PipelineError::Cancelled { run_id });
                }
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok(batch)) => {
                        for (idx, result) in batch {
                            slots[idx] = Some(result);
                        }
                    }
                    Some(Err(e)) if e.is_panic() => {
                        let platform = task_platforms.get(&e.id()).map_or("<unknown>", String::as_str);
                        warn!(%platform, "platform task panicked, its jobs are incomplete");
                    }
                    Some(Err(e)) => {
                        return Err(PipelineError::Join(format!("platform task join error: {e}")));
                    }
                },
            }
        }

        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled { run_id });
        }

        let results: Vec<JobResult> = slots.into_iter().flatten().collect();
        let gate = GateEvaluator::report(plan, &results);
        let duration_ms = start.elapsed().as_millis() as u64;

        if gate.decision.is_pass() {
            info!(duration_ms, "{}", gate.message);
        } else {
            warn!(duration_ms, "{}", gate.message);
        }

        Ok(RunReport {
            run_id,
            plan_digest: plan.digest().to_string(),
            results,
            gate,
            started_at,
            duration_ms,
        })
    }
}

/// Prepare one platform, then run its jobs in order, each holding a permit
/// from the shared semaphore.
async fn run_platform(
    environment: Arc<dyn Environment>,
    executor: JobExecutor,
    jobs: Vec<(usize, Job)>,
    semaphore: Arc<Semaphore>,
) -> Vec<(usize, JobResult)> {
    let (indices, jobs): (Vec<usize>, Vec<Job>) = jobs.into_iter().unzip();

    if let Err(err) = environment.prepare().await {
        warn!(
            platform = %environment.platform_id(),
            jobs = jobs.len(),
            "skipping jobs after setup failure"
        );
        return indices.into_iter().zip(setup_failures(&jobs, &err)).collect();
    }

    let mut results = Vec::with_capacity(jobs.len());
    for (idx, job) in indices.into_iter().zip(&jobs) {
        let _permit = semaphore.acquire().await.ok();
        match AssertUnwindSafe(executor.execute(job)).catch_unwind().await {
            Ok(result) => results.push((idx, result)),
            Err(_) => warn!(job = %job.id, "job panicked, no result recorded"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;
    use featgate_core::{FeatureSet, JobPlanner, Platform, PolicyFile, RunContext, Trigger};
    use std::path::PathBuf;

    fn plan_for(file: &PolicyFile) -> (Plan, PlatformRegistry) {
        let (features, platforms) = file.to_registries().expect("registries");
        let plan = JobPlanner::new(&features, &platforms, &file.policy)
            .plan(RunContext::new(
                Trigger::push_to_main(),
                "abc123",
                "stable",
                PathBuf::from("/work"),
            ))
            .expect("plan");
        (plan, platforms)
    }

    #[test]
    fn test_cancellation_handle() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_results_follow_plan_order() {
        let file = PolicyFile::builtin();
        let (plan, platforms) = plan_for(&file);
        let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()));

        let report = pipeline.run(&plan, &platforms).await.expect("run");

        let planned: Vec<&str> = plan.jobs().iter().map(|j| j.id.as_str()).collect();
        let reported: Vec<&str> = report.results.iter().map(|r| r.job.id.as_str()).collect();
        assert_eq!(reported, planned);
        assert!(report.is_pass());
        assert_eq!(report.passed_count(), plan.len());
        assert_eq!(report.plan_digest, plan.digest());
    }

    #[tokio::test]
    async fn test_platform_runner_override() {
        let file = PolicyFile::builtin();
        let (plan, platforms) = plan_for(&file);
        let default_runner = Arc::new(ScriptedRunner::new());
        let macos_runner = Arc::new(ScriptedRunner::new());
        let pipeline = Pipeline::new(file.policy.clone(), default_runner.clone())
            .with_platform_runner("macos", macos_runner.clone());

        pipeline.run(&plan, &platforms).await.expect("run");

        // check + tests on macos; no setup steps.
        assert_eq!(macos_runner.calls().len(), 2);
        // 2 linux setup steps, 4 linux jobs, check + tests on windows.
        assert_eq!(default_runner.calls().len(), 8);
    }

    #[tokio::test]
    async fn test_plan_platform_missing_from_registry() {
        let file = PolicyFile::builtin();
        let (plan, _) = plan_for(&file);
        let mut platforms = PlatformRegistry::new();
        platforms.register(Platform::new("linux")).expect("register");

        let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()));
        let err = pipeline.run(&plan, &platforms).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Plan(PlanError::UnknownPlatform { .. })
        ));
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let file = PolicyFile::builtin();
        let (plan, platforms) = plan_for(&file);
        let runner = Arc::new(ScriptedRunner::new());
        let pipeline = Pipeline::new(file.policy.clone(), runner.clone());

        pipeline.cancellation_handle().cancel();
        let err = pipeline.run(&plan, &platforms).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { run_id } if run_id == plan.context().run_id));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_panic_leaves_platform_incomplete() {
        let file = PolicyFile::builtin();
        let (plan, platforms) = plan_for(&file);
        let linux = Arc::new(ScriptedRunner::new().panic_on("apt-get"));
        let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()))
            .with_platform_runner("linux", linux.clone());

        let report = pipeline.run(&plan, &platforms).await.expect("run");

        assert_eq!(linux.count_matching("cargo"), 0);
        assert_eq!(report.results.len(), 4);
        assert!(report.results.iter().all(|r| r.job.platform != "linux"));
        let blocked = report.gate.decision.blocked();
        assert_eq!(blocked.len(), 4);
        assert!(blocked
            .iter()
            .all(|b| b.platform == "linux" && b.failure == featgate_core::JobFailure::Incomplete));
    }

    #[tokio::test]
    async fn test_restricted_plan_runs_one_platform() {
        let file = PolicyFile::builtin();
        let (plan, platforms) = plan_for(&file);
        let plan = plan.restrict_to("windows");
        let runner = Arc::new(ScriptedRunner::new());

        let report = Pipeline::new(file.policy.clone(), runner.clone())
            .run(&plan, &platforms)
            .await
            .expect("run");

        assert_eq!(report.results.len(), 2);
        assert!(report
            .results
            .iter()
            .all(|r| r.job.platform == "windows" && r.job.feature_set != FeatureSet::empty()));
    }
}
