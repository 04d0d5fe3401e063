//! Integration tests for the pipeline with scripted runners.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use featgate_ci::fakes::ScriptedRunner;
use featgate_ci::{CommandOutput, Pipeline, PipelineError, ProcessRunner, RunnerError};
use featgate_core::{
    GateDecision, JobFailure, JobPlanner, Outcome, Plan, PlatformRegistry, PolicyFile,
    RunContext, Trigger,
};

fn plan_for(file: &PolicyFile) -> (Plan, PlatformRegistry) {
    let (features, platforms) = file.to_registries().expect("registries");
    let plan = JobPlanner::new(&features, &platforms, &file.policy)
        .plan(RunContext::new(
            Trigger::PullRequest { number: Some(42) },
            "0123456789abcdef0123456789abcdef01234567",
            "stable-x86_64-unknown-linux-gnu",
            PathBuf::from("."),
        ))
        .expect("plan");
    (plan, platforms)
}

/// Test: every job succeeds → Pass with one result per job
#[tokio::test]
async fn test_all_jobs_pass() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);
    let runner = Arc::new(ScriptedRunner::new());

    let report = Pipeline::new(file.policy.clone(), runner.clone())
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");

    assert_eq!(report.results.len(), plan.len());
    assert_eq!(report.gate.decision, GateDecision::Pass);
    assert_eq!(report.passed_count(), 8);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.run_id, plan.context().run_id);

    // Two linux setup steps plus one command per job.
    assert_eq!(runner.calls().len(), 10);
    assert_eq!(runner.count_matching("apt-get install"), 1);
    assert_eq!(
        runner.count_matching("--features lua54,lua_script_api,rhai,rhai_script_api,teal"),
        7
    );
}

/// Test: linux setup fails → every linux job fails with SetupError, nothing
/// runs on linux, windows and macos are evaluated independently
#[tokio::test]
async fn test_linux_setup_failure_isolated() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);

    let linux = Arc::new(ScriptedRunner::new().respond(
        "apt-get install",
        Ok(CommandOutput {
            exit_code: 100,
            stderr: "E: Unable to locate package libasound2-dev".to_string(),
            ..CommandOutput::default()
        }),
    ));
    let others = Arc::new(ScriptedRunner::new());
    let pipeline = Pipeline::new(file.policy.clone(), others.clone())
        .with_platform_runner("linux", linux.clone());

    let report = pipeline.run(&plan, &platforms).await.expect("pipeline failed");
    assert_eq!(report.results.len(), plan.len());

    for result in &report.results {
        if result.job.platform == "linux" {
            match &result.outcome {
                Outcome::Failure(JobFailure::SetupError {
                    platform,
                    step,
                    reason,
                }) => {
                    assert_eq!(platform, "linux");
                    assert_eq!(step, "install native audio/input libraries");
                    assert!(reason.contains("libasound2-dev"));
                }
                other => panic!("{} should fail setup, got {other:?}", result.job.id),
            }
        } else {
            assert!(result.passed(), "{} should pass", result.job.id);
        }
    }

    assert_eq!(linux.count_matching("cargo"), 0);
    assert_eq!(others.count_matching("cargo"), 4);

    let blocked = report.gate.decision.blocked();
    assert_eq!(blocked.len(), 4);
    assert!(blocked.iter().all(|b| b.platform == "linux"));
}

/// Test: one test job times out → only that job blocks
#[tokio::test]
async fn test_windows_test_timeout_blocks_only_that_job() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);

    let windows = Arc::new(ScriptedRunner::new().respond(
        "cargo test",
        Err(RunnerError::Timeout {
            program: "cargo".to_string(),
            limit_secs: 0,
        }),
    ));
    let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()))
        .with_platform_runner("windows", windows);

    let report = pipeline.run(&plan, &platforms).await.expect("pipeline failed");

    let blocked = report.gate.decision.blocked();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].job_id, "tests/windows");
    assert_eq!(blocked[0].failure, JobFailure::Timeout { limit_secs: 1200 });

    assert!(report.gate.by_job_name["check"].is_pass());
    assert!(report.gate.by_job_name["fmt"].is_pass());
    assert!(report.gate.by_job_name["clippy"].is_pass());
    assert!(!report.gate.by_job_name["tests"].is_pass());
}

/// Test: format check on canonical input succeeds on every repetition
#[tokio::test]
async fn test_format_check_is_idempotent() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);
    let plan = plan.restrict_to("linux");
    let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()));

    for _ in 0..3 {
        let report = pipeline.run(&plan, &platforms).await.expect("pipeline failed");
        let fmt = report
            .results
            .iter()
            .find(|r| r.job.id == "fmt/linux")
            .expect("fmt result");
        assert_eq!(fmt.outcome, Outcome::Success);
        assert!(fmt.diagnostics.is_empty());
    }
}

/// Test: cancelling mid-run discards partial results
#[tokio::test]
async fn test_cancellation_discards_results() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);
    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_secs(30)));
    let pipeline = Pipeline::new(file.policy.clone(), runner.clone());
    let handle = pipeline.cancellation_handle();

    let start = Instant::now();
    let (result, _) = tokio::join!(pipeline.run(&plan, &platforms), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    match result {
        Err(PipelineError::Cancelled { run_id }) => assert_eq!(run_id, plan.context().run_id),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(!runner.calls().is_empty());
}

/// Test: concurrency never exceeds the policy bound
#[tokio::test]
async fn test_single_slot_serializes_jobs() {
    let mut file = PolicyFile::builtin();
    file.policy.max_concurrent_jobs = 1;
    let (plan, platforms) = plan_for(&file);
    let plan = plan.restrict_to("windows");
    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_millis(100)));

    let start = Instant::now();
    let report = Pipeline::new(file.policy.clone(), runner)
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");

    assert_eq!(report.results.len(), 2);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

/// Test: macos jobs panic → they block as Incomplete, linux and windows
/// results are kept and pass
#[tokio::test]
async fn test_panicking_platform_runner_is_isolated() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);
    let macos = Arc::new(ScriptedRunner::new().panic_on("cargo"));
    let pipeline = Pipeline::new(file.policy.clone(), Arc::new(ScriptedRunner::new()))
        .with_platform_runner("macos", macos.clone());

    let report = pipeline.run(&plan, &platforms).await.expect("pipeline failed");

    assert_eq!(macos.count_matching("cargo"), 2);
    assert_eq!(report.results.len(), plan.len() - 2);
    assert!(report.results.iter().all(|r| r.job.platform != "macos" && r.passed()));

    let blocked = report.gate.decision.blocked();
    assert_eq!(blocked.len(), 2);
    assert!(blocked
        .iter()
        .all(|b| b.platform == "macos" && b.failure == JobFailure::Incomplete));
}

/// Test: jobs on one platform never overlap, even with free slots
#[tokio::test]
async fn test_jobs_on_one_platform_run_one_at_a_time() {
    let mut file = PolicyFile::builtin();
    file.policy.max_concurrent_jobs = 4;
    let (plan, platforms) = plan_for(&file);
    let plan = plan.restrict_to("linux");
    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_millis(20)));

    let report = Pipeline::new(file.policy.clone(), runner.clone())
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");

    assert_eq!(report.results.len(), 4);
    assert!(report.is_pass());
    assert_eq!(runner.max_in_flight(), 1);
}

/// Test: platforms still run side by side
#[tokio::test]
async fn test_platforms_run_concurrently() {
    let file = PolicyFile::builtin();
    let (plan, platforms) = plan_for(&file);
    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_millis(50)));

    let report = Pipeline::new(file.policy.clone(), runner.clone())
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");

    assert!(report.is_pass());
    assert!(runner.max_in_flight() > 1);
    assert!(runner.max_in_flight() <= file.policy.max_concurrent_jobs);
}

/// Test: real processes through the production runner
#[cfg(unix)]
#[tokio::test]
async fn test_process_runner_end_to_end() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let toml = r#"
        [policy]
        canonical_platform = "linux"
        cargo = "true"

        [[feature]]
        name = "lua54"

        [[platform]]
        id = "linux"

        [[platform]]
        id = "macos"
    "#;
    let file = PolicyFile::from_toml_str(toml).expect("policy");
    let (features, platforms) = file.to_registries().expect("registries");
    let plan = JobPlanner::new(&features, &platforms, &file.policy)
        .plan(RunContext::new(
            Trigger::push_to_main(),
            "abc123",
            "stable",
            workspace.path().to_path_buf(),
        ))
        .expect("plan");

    let report = Pipeline::new(file.policy.clone(), Arc::new(ProcessRunner::new()))
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");
    assert!(report.is_pass());
    assert_eq!(report.results.len(), 6);

    let mut failing = file.policy.clone();
    failing.cargo = "false".to_string();
    let report = Pipeline::new(failing, Arc::new(ProcessRunner::new()))
        .run(&plan, &platforms)
        .await
        .expect("pipeline failed");
    assert_eq!(report.failed_count(), 6);
    assert!(!report.is_pass());
}
