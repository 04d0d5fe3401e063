//! featgate - feature-matrix build verification CLI
//!
//! ## Commands
//!
//! - `plan`: Show the jobs a trigger would run
//! - `run`: Execute the host platform's jobs (or every platform's with
//!   `--all-platforms`) and evaluate the gate
//! - `validate`: Check a policy file and its feature graph
//! - `features`: List registered features and platforms

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use featgate_ci::{workspace_info, Pipeline, ProcessRunner, RunReport};
use featgate_core::{
    host_platform_id, FeatureRegistry, JobPlanner, Plan, PlatformRegistry, PolicyFile,
    RunContext, Trigger,
};

#[derive(Parser)]
#[command(name = "featgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Feature-matrix build verification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Policy file (TOML). The built-in manifest is used when omitted
    #[arg(short, long, global = true, env = "FEATGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace the jobs run in
    #[arg(short, long, global = true, env = "FEATGATE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TriggerKind {
    PullRequest,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Options shared by commands that build a plan.
#[derive(clap::Args, Debug, Clone)]
struct PlanArgs {
    /// Event that triggered the run
    #[arg(long, value_enum, default_value = "pull-request")]
    trigger: TriggerKind,

    /// Pull request number
    #[arg(long)]
    pr: Option<u64>,

    /// Branch pushed to
    #[arg(long, default_value = "main")]
    branch: String,

    /// Commit under test (auto-detected from the workspace if omitted)
    #[arg(long)]
    sha: Option<String>,

    /// Only the jobs for this platform
    #[arg(long, conflicts_with = "host")]
    platform: Option<String>,

    /// Only the jobs for the platform this binary runs on
    #[arg(long)]
    host: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl PlanArgs {
    fn trigger(&self) -> Trigger {
        match self.trigger {
            TriggerKind::PullRequest => Trigger::PullRequest { number: self.pr },
            TriggerKind::Push => Trigger::Push {
                branch: self.branch.clone(),
            },
        }
    }

    fn platform_filter(&self) -> Option<&str> {
        if self.host {
            Some(host_platform_id())
        } else {
            self.platform.as_deref()
        }
    }

    /// Platform a run is restricted to. Jobs execute on this machine, so a
    /// run stays on the host platform unless `all_platforms` is set.
    fn run_filter(&self, all_platforms: bool) -> Option<&str> {
        if all_platforms {
            None
        } else {
            Some(self.platform_filter().unwrap_or(host_platform_id()))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the jobs a trigger would run
    Plan {
        #[command(flatten)]
        args: PlanArgs,
    },

    /// Execute the plan and evaluate the gate; exits non-zero when blocked.
    /// Runs the host platform's jobs unless told otherwise
    Run {
        #[command(flatten)]
        args: PlanArgs,

        /// Run every platform's jobs on this machine
        #[arg(long, conflicts_with_all = ["platform", "host"])]
        all_platforms: bool,
    },

    /// Check a policy file, its feature graph and its feature sets
    Validate {
        /// Print the effective policy as TOML
        #[arg(long)]
        print: bool,
    },

    /// List registered features and platforms
    Features,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    featgate_core::init_tracing(cli.json, level);

    let policy = load_policy(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { args } => cmd_plan(&policy, &cli.workspace, &args),
        Commands::Run {
            args,
            all_platforms,
        } => cmd_run(&policy, &cli.workspace, &args, all_platforms).await,
        Commands::Validate { print } => cmd_validate(&policy, print),
        Commands::Features => cmd_features(&policy),
    }
}

fn load_policy(path: Option<&Path>) -> Result<PolicyFile> {
    match path {
        Some(path) => PolicyFile::load(path)
            .with_context(|| format!("Failed to load policy file {}", path.display())),
        None => Ok(PolicyFile::builtin()),
    }
}

fn registries(policy: &PolicyFile) -> Result<(FeatureRegistry, PlatformRegistry)> {
    policy
        .to_registries()
        .context("Failed to build registries from policy")
}

fn build_context(workspace: &Path, args: &PlanArgs) -> RunContext {
    let git_sha = match &args.sha {
        Some(sha) => sha.clone(),
        None => workspace_info::capture_head_sha(workspace).unwrap_or_else(|e| {
            warn!(error = %e, "could not determine commit, continuing without one");
            "unknown".to_string()
        }),
    };
    let toolchain = workspace_info::active_toolchain(workspace);
    RunContext::new(args.trigger(), git_sha, toolchain, workspace.to_path_buf())
}

fn build_plan(
    policy: &PolicyFile,
    workspace: &Path,
    args: &PlanArgs,
    filter: Option<&str>,
) -> Result<Plan> {
    let (features, platforms) = registries(policy)?;
    let context = build_context(workspace, args);
    let plan = JobPlanner::new(&features, &platforms, &policy.policy)
        .plan(context)
        .context("Failed to plan jobs")?;

    match filter {
        Some(platform) => {
            if !platforms.contains(platform) {
                anyhow::bail!("Unknown platform: {}", platform);
            }
            Ok(plan.restrict_to(platform))
        }
        None => Ok(plan),
    }
}

fn cmd_plan(policy: &PolicyFile, workspace: &Path, args: &PlanArgs) -> Result<()> {
    let plan = build_plan(policy, workspace, args, args.platform_filter())?;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let context = plan.context();
    println!("Run ID: {}", context.run_id);
    println!("Trigger: {}", context.trigger.label());
    println!("Git SHA: {}", context.git_sha);
    println!("Toolchain: {}", context.toolchain);
    println!("Digest: {}", plan.digest());
    println!();

    for job in plan.jobs() {
        println!("  {:<32} {}", job.id, job.feature_set);
    }

    println!();
    println!(
        "{} job(s) on {} platform(s)",
        plan.len(),
        plan.platforms().len()
    );
    Ok(())
}

async fn cmd_run(
    policy: &PolicyFile,
    workspace: &Path,
    args: &PlanArgs,
    all_platforms: bool,
) -> Result<()> {
    let plan = build_plan(policy, workspace, args, args.run_filter(all_platforms))?;
    let (_, platforms) = registries(policy)?;

    info!(run_id = %plan.context().run_id, jobs = plan.len(), "running plan");

    let pipeline = Pipeline::new(policy.policy.clone(), Arc::new(ProcessRunner::new()));
    let handle = pipeline.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let report = pipeline
        .run(&plan, &platforms)
        .await
        .context("Pipeline failed to run")?;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_pass() {
        Ok(())
    } else {
        anyhow::bail!("{}", report.gate.message)
    }
}

fn print_report(report: &RunReport) {
    println!("Run ID: {}", report.run_id);
    println!("Duration: {}ms", report.duration_ms);
    println!();

    for result in &report.results {
        let status = if result.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms)",
            status, result.job.id, result.duration_ms
        );
        if let Some(failure) = result.outcome.failure() {
            println!("      {}", failure);
        }
        for diag in result.diagnostics.iter().take(5) {
            match (&diag.file, diag.line) {
                (Some(file), Some(line)) => println!("      {}:{}: {}", file, line, diag.message),
                _ => println!("      {}", diag.message),
            }
        }
    }

    println!();
    for (name, decision) in &report.gate.by_job_name {
        let status = if decision.is_pass() { "✓ PASSED" } else { "✗ BLOCKED" };
        println!("  {:<8} {}", name, status);
    }

    println!();
    println!(
        "Summary: {}/{} jobs passed",
        report.passed_count(),
        report.results.len()
    );
    println!("Gate: {}", report.gate.message);
}

fn cmd_validate(policy: &PolicyFile, print: bool) -> Result<()> {
    let (features, platforms) = registries(policy)?;
    let jobs = JobPlanner::new(&features, &platforms, &policy.policy)
        .plan_jobs()
        .context("Policy does not produce a valid plan")?;

    if print {
        print!("{}", policy.to_toml_string()?);
        return Ok(());
    }

    println!("✓ Policy is valid");
    println!("  Features: {}", features.len());
    println!("  Platforms: {}", platforms.len());
    println!(
        "  Maximal set: {}",
        policy.policy.maximal_feature_set(&features)
    );
    println!("  Jobs per run: {}", jobs.len());
    Ok(())
}

fn cmd_features(policy: &PolicyFile) -> Result<()> {
    let (features, platforms) = registries(policy)?;
    let maximal = policy.policy.maximal_feature_set(&features);

    println!("Features:");
    for feature in features.all_features() {
        let marker = if maximal.contains(&feature.name) { "*" } else { " " };
        let mut line = format!("  {} {}", marker, feature.name);
        if !feature.requires.is_empty() {
            let requires: Vec<&str> = feature.requires.iter().map(String::as_str).collect();
            line.push_str(&format!("  requires: {}", requires.join(", ")));
        }
        if !feature.conflicts.is_empty() {
            let conflicts: Vec<&str> = feature.conflicts.iter().map(String::as_str).collect();
            line.push_str(&format!("  conflicts: {}", conflicts.join(", ")));
        }
        println!("{}", line);
    }

    println!();
    println!("Platforms:");
    for platform in platforms.all_platforms() {
        let canonical = if platform.id == policy.policy.canonical_platform {
            " (canonical)"
        } else {
            ""
        };
        println!("  {}{}", platform.id, canonical);
        for step in &platform.setup {
            println!("      setup: {} ({})", step.name, step.command.join(" "));
        }
    }
    Ok(())
}
