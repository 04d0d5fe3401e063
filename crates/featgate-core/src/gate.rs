//! Gate evaluation: reduce job results to a single pass/fail decision.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::job::{Action, Job};
use crate::domain::result::{JobFailure, JobResult, Outcome};
use crate::planner::Plan;

/// A planned job that keeps the gate closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedJob {
    pub job_id: String,
    pub job_name: String,
    pub platform: String,
    pub failure: JobFailure,
}

impl BlockedJob {
    fn new(job: &Job, failure: JobFailure) -> Self {
        Self {
            job_id: job.id.clone(),
            job_name: job.job_name().to_string(),
            platform: job.platform.clone(),
            failure,
        }
    }
}

/// Pass/fail signal consumed by the surrounding workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "blocked", rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Block(Vec<BlockedJob>),
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }

    pub fn blocked(&self) -> &[BlockedJob] {
        match self {
            GateDecision::Pass => &[],
            GateDecision::Block(jobs) => jobs,
        }
    }
}

/// Gate outcome with the per-job-name breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub decision: GateDecision,

    /// One decision per job name (`check`, `fmt`, `clippy`, `tests`).
    pub by_job_name: BTreeMap<String, GateDecision>,

    pub passed: usize,

    pub failed: usize,

    pub message: String,
}

/// Pure reduction from results to a gate decision.
pub struct GateEvaluator;

impl GateEvaluator {
    /// Evaluate a plan against its reported results.
    ///
    /// Gate rule:
    /// - Every planned job needs a result; a missing one blocks as `Incomplete`
    /// - A job reported more than once passes only if every report passed
    /// - Results for jobs outside the plan are ignored
    /// - `Pass` iff no planned job is blocked
    pub fn evaluate(plan: &Plan, results: &[JobResult]) -> GateDecision {
        let blocked = Self::blocked_jobs(plan, results);
        if blocked.is_empty() {
            GateDecision::Pass
        } else {
            GateDecision::Block(blocked)
        }
    }

    /// One decision per job name present in the plan.
    pub fn evaluate_by_job_name(
        plan: &Plan,
        results: &[JobResult],
    ) -> BTreeMap<String, GateDecision> {
        let blocked = Self::blocked_jobs(plan, results);

        let mut by_name: BTreeMap<String, Vec<BlockedJob>> = BTreeMap::new();
        for action in Action::ALL {
            if plan.count_by_action(action) > 0 {
                by_name.entry(action.job_name().to_string()).or_default();
            }
        }
        for job in blocked {
            by_name.entry(job.job_name.clone()).or_default().push(job);
        }

        by_name
            .into_iter()
            .map(|(name, jobs)| {
                let decision = if jobs.is_empty() {
                    GateDecision::Pass
                } else {
                    GateDecision::Block(jobs)
                };
                (name, decision)
            })
            .collect()
    }

    /// Full report: overall decision, per-name decisions and counts.
    pub fn report(plan: &Plan, results: &[JobResult]) -> GateReport {
        let decision = Self::evaluate(plan, results);
        let by_job_name = Self::evaluate_by_job_name(plan, results);
        let failed = decision.blocked().len();
        let passed = plan.len() - failed;

        let message = if decision.is_pass() {
            format!("All {} job(s) passed", plan.len())
        } else {
            format!("Gate blocked by {} of {} job(s)", failed, plan.len())
        };

        GateReport {
            decision,
            by_job_name,
            passed,
            failed,
            message,
        }
    }

    fn blocked_jobs(plan: &Plan, results: &[JobResult]) -> Vec<BlockedJob> {
        let mut by_id: HashMap<&str, Vec<&JobResult>> = HashMap::new();
        for result in results {
            if plan.job(&result.job.id).is_none() {
                warn!(job = %result.job.id, "ignoring result for job outside the plan");
                continue;
            }
            by_id.entry(result.job.id.as_str()).or_default().push(result);
        }

        let mut blocked = Vec::new();
        for job in plan.jobs() {
            let reported = by_id.get(job.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            if reported.is_empty() {
                blocked.push(BlockedJob::new(job, JobFailure::Incomplete));
                continue;
            }

            let first_failure = reported.iter().find_map(|r| match &r.outcome {
                Outcome::Success => None,
                Outcome::Failure(f) => Some(f.clone()),
            });
            if let Some(failure) = first_failure {
                blocked.push(BlockedJob::new(job, failure));
            }
        }
        blocked
    }
}
