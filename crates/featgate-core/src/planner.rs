//! Job planning: registries + policy → deterministic plan.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::context::RunContext;
use crate::domain::error::{PlanError, PlanResult};
use crate::domain::feature::FeatureSet;
use crate::domain::job::{Action, Job};
use crate::policy::{Coverage, VerificationPolicy};
use crate::registry::{FeatureRegistry, PlatformRegistry};

/// The full ordered set of jobs for one verification run.
///
/// Created once per triggering event and never mutated; executors only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    context: RunContext,
    jobs: Vec<Job>,
    digest: String,
}

impl Plan {
    fn new(context: RunContext, jobs: Vec<Job>) -> Self {
        let digest = compute_jobs_digest(&jobs);
        Self {
            context,
            jobs,
            digest,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// SHA-256 over the ordered jobs. Independent of the run id.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Jobs targeting `platform`, in plan order.
    pub fn jobs_for_platform(&self, platform: &str) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.platform == platform).collect()
    }

    /// Platforms with at least one job, sorted.
    pub fn platforms(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .map(|j| j.platform.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn count_by_action(&self, action: Action) -> usize {
        self.jobs.iter().filter(|j| j.action == action).count()
    }

    /// A new plan holding only `platform`'s jobs, for a runner that executes
    /// one platform. `self` is left untouched.
    pub fn restrict_to(&self, platform: &str) -> Plan {
        let jobs = self
            .jobs
            .iter()
            .filter(|j| j.platform == platform)
            .cloned()
            .collect();
        Plan::new(self.context.clone(), jobs)
    }
}

/// Builds plans from the registries and a policy.
pub struct JobPlanner<'a> {
    features: &'a FeatureRegistry,
    platforms: &'a PlatformRegistry,
    policy: &'a VerificationPolicy,
}

impl<'a> JobPlanner<'a> {
    pub fn new(
        features: &'a FeatureRegistry,
        platforms: &'a PlatformRegistry,
        policy: &'a VerificationPolicy,
    ) -> Self {
        Self {
            features,
            platforms,
            policy,
        }
    }

    /// Plan a run. Fails before producing any job if the policy references an
    /// invalid feature set or an unregistered platform.
    pub fn plan(&self, context: RunContext) -> PlanResult<Plan> {
        let jobs = self.plan_jobs()?;
        let plan = Plan::new(context, jobs);
        debug!(
            run_id = %plan.context.run_id,
            jobs = plan.len(),
            digest = %plan.digest,
            "planned verification run"
        );
        Ok(plan)
    }

    /// The job list alone; deterministic for identical inputs.
    pub fn plan_jobs(&self) -> PlanResult<Vec<Job>> {
        self.features.check_graph()?;

        if self.platforms.is_empty() {
            return Err(PlanError::NoPlatforms);
        }
        let canonical = self.policy.canonical_platform.as_str();
        if !self.platforms.contains(canonical) {
            return Err(PlanError::UnknownPlatform {
                id: canonical.to_string(),
            });
        }

        let maximal = self.policy.maximal_feature_set(self.features);
        self.features.validate(&maximal)?;
        let default_set = self
            .policy
            .default_features
            .clone()
            .unwrap_or_else(|| self.features.default_feature_set());
        self.features.validate(&default_set)?;

        let mut jobs = Vec::new();
        for action in Action::ALL {
            if action.is_cross_platform() {
                for platform in self.platforms.all_platforms() {
                    jobs.push(Job::new(platform.id.clone(), maximal.clone(), action));
                }
            } else {
                jobs.push(Job::new(canonical, maximal.clone(), action));
            }

            if action == Action::TypeCheck && self.policy.coverage == Coverage::EachFeature {
                jobs.extend(self.per_feature_checks(canonical, &maximal, &default_set)?);
            }
        }

        ensure_unique_ids(&jobs)?;
        Ok(jobs)
    }

    /// One type-check per distinct strict subset of the maximal set: the
    /// default set, then each feature's requires-closure in feature-name order.
    /// Features outside the maximal set are never planned.
    fn per_feature_checks(
        &self,
        canonical: &str,
        maximal: &FeatureSet,
        default_set: &FeatureSet,
    ) -> PlanResult<Vec<Job>> {
        let mut seen: BTreeSet<FeatureSet> = BTreeSet::new();

        let candidates = std::iter::once(default_set.clone()).chain(
            self.features
                .all_features()
                .into_iter()
                .map(|f| self.features.closure([f.name.as_str()])),
        );

        let mut jobs = Vec::new();
        for set in candidates {
            if !set.is_strict_subset_of(maximal) || !seen.insert(set.clone()) {
                continue;
            }
            self.features.validate(&set)?;
            jobs.push(Job::with_feature_suffix(canonical, set, Action::TypeCheck));
        }
        Ok(jobs)
    }
}

/// Results are keyed by job id, so two jobs sharing one would let a single
/// result stand in for both.
fn ensure_unique_ids(jobs: &[Job]) -> PlanResult<()> {
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    match jobs.iter().find(|job| !ids.insert(job.id.as_str())) {
        Some(job) => Err(PlanError::DuplicateJobId { id: job.id.clone() }),
        None => Ok(()),
    }
}

/// Deterministic digest of ordered job ids and feature sets.
fn compute_jobs_digest(jobs: &[Job]) -> String {
    let mut hasher = Sha256::new();
    for job in jobs {
        hasher.update(job.id.as_bytes());
        hasher.update(b"\0");
        hasher.update(job.feature_set.to_flag_value().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
