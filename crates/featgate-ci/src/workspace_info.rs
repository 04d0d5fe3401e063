//! Workspace facts (commit and toolchain) used to build a run context.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Capture the HEAD commit SHA of the repository containing `repo_dir`.
///
/// Fails if git is unavailable or the directory is not inside a repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .context("failed to run git")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git rev-parse HEAD failed: {}", stderr.trim());
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        bail!("git rev-parse HEAD returned empty output");
    }
    Ok(sha)
}

/// The active rustup toolchain for `dir`, or `"unknown"`.
pub fn active_toolchain(dir: &Path) -> String {
    Command::new("rustup")
        .args(["show", "active-toolchain"])
        .current_dir(dir)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| {
            String::from_utf8_lossy(&o.stdout)
                .split_whitespace()
                .next()
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}
