//! Diagnostics parser for cargo output.
//!
//! Normalizes raw rustc/clippy/rustfmt/libtest output into structured
//! [`Diagnostic`] entries attached to job results.

use featgate_core::{Action, Diagnostic, DiagnosticSource, Severity};

use crate::runner::CommandOutput;

/// Configuration for the diagnostics parser.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    /// Maximum number of diagnostics retained per job.
    pub max_per_job: usize,

    /// Minimum severity to include.
    pub min_severity: Severity,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_per_job: 100,
            min_severity: Severity::Warning,
        }
    }
}

/// Parse a job's output into diagnostics for its action.
pub fn parse_diagnostics(
    action: Action,
    output: &CommandOutput,
    config: &DiagnosticsConfig,
) -> Vec<Diagnostic> {
    let text = output.combined();
    let mut diagnostics = match action {
        Action::TypeCheck | Action::Lint => parse_compiler(&text, action.into()),
        Action::FormatCheck => parse_fmt(&text),
        Action::Test => parse_tests(&text),
    };

    diagnostics.retain(|d| d.severity >= config.min_severity);
    diagnostics.truncate(config.max_per_job);
    diagnostics
}

/// Names of failed test cases, in output order.
pub fn failed_tests(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("test ")?;
            let name = rest.strip_suffix(" ... FAILED")?;
            Some(name.trim().to_string())
        })
        .collect()
}

/// Files rustfmt would change, in output order, without duplicates.
pub fn unformatted_files(text: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some((file, _)) = parse_fmt_diff_line(line) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files
}

/// The panic message reported for `case`: the line following its
/// `thread '<case>' panicked at` header.
pub fn panic_message(text: &str, case: &str) -> Option<String> {
    let header = format!("thread '{case}' panicked at");
    let mut lines = text.lines();
    lines.find(|line| line.trim().starts_with(&header))?;
    lines
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("note:"))
        .map(str::to_string)
}

fn is_summary(message: &str) -> bool {
    message.starts_with("aborting due to")
        || message.starts_with("could not compile")
        || (message.starts_with('`') && message.contains("generated"))
        || message.starts_with("build failed")
}

/// `error[E0308]: mismatched types` → (Error, Some("E0308"), "mismatched types")
fn parse_compiler_header(line: &str) -> Option<(Severity, Option<String>, String)> {
    let (severity, rest) = if let Some(rest) = line.strip_prefix("error") {
        (Severity::Error, rest)
    } else if let Some(rest) = line.strip_prefix("warning") {
        (Severity::Warning, rest)
    } else {
        return None;
    };

    let (code, rest) = match rest.strip_prefix('[') {
        Some(bracketed) => {
            let end = bracketed.find(']')?;
            (Some(bracketed[..end].to_string()), &bracketed[end + 1..])
        }
        None => (None, rest),
    };

    let message = rest.strip_prefix(": ")?.trim().to_string();
    Some((severity, code, message))
}

/// `src/lib.rs:10:5` → ("src/lib.rs", 10, 5)
fn parse_file_line_col(location: &str) -> Option<(String, u32, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line_no = parts.next()?.parse().ok()?;
    let file = parts.next()?.to_string();
    Some((file, line_no, column))
}

/// `  --> src/lib.rs:10:5`
fn parse_location(line: &str) -> Option<(String, u32, u32)> {
    parse_file_line_col(line.trim().strip_prefix("-->")?.trim())
}

/// Pull `clippy::lint_name` out of a note line. Lint names are reported with
/// dashes in `-D` notes and underscores elsewhere; both normalize to underscores.
fn parse_clippy_code(line: &str) -> Option<String> {
    let start = line.find("clippy::")?;
    let name: String = line[start..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(*c, '_' | '-' | ':'))
        .map(|c| if c == '-' { '_' } else { c })
        .collect();
    Some(name)
}

fn parse_compiler(text: &str, source: DiagnosticSource) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut current: Option<Diagnostic> = None;

    for line in text.lines() {
        if let Some((severity, code, message)) = parse_compiler_header(line) {
            diagnostics.extend(current.take());
            if is_summary(&message) {
                continue;
            }
            let mut diag =
                Diagnostic::new(severity, message, source).with_evidence(line.to_string());
            if let Some(code) = code {
                diag = diag.with_code(code);
            }
            current = Some(diag);
            continue;
        }

        let Some(diag) = current.as_mut() else {
            continue;
        };
        if diag.file.is_none() {
            if let Some((file, line_no, column)) = parse_location(line) {
                diag.file = Some(file);
                diag.line = Some(line_no);
                diag.column = Some(column);
                continue;
            }
        }
        if diag.code.is_none() {
            if let Some(code) = parse_clippy_code(line) {
                diag.code = Some(code);
            }
        }
    }
    diagnostics.extend(current);
    diagnostics
}

/// `Diff in /work/src/lib.rs at line 3:` or `Diff in /work/src/lib.rs:3:`
fn parse_fmt_diff_line(line: &str) -> Option<(String, Option<u32>)> {
    let rest = line.trim().strip_prefix("Diff in ")?;
    if let Some((file, tail)) = rest.split_once(" at line ") {
        let line_no = tail.trim_end_matches(':').trim().parse().ok();
        return Some((file.to_string(), line_no));
    }
    let rest = rest.trim_end_matches(':');
    match rest.rsplit_once(':') {
        Some((file, line_no)) if line_no.chars().all(|c| c.is_ascii_digit()) => {
            Some((file.to_string(), line_no.parse().ok()))
        }
        _ => Some((rest.to_string(), None)),
    }
}

fn parse_fmt(text: &str) -> Vec<Diagnostic> {
    text.lines()
        .filter_map(|line| {
            let (file, line_no) = parse_fmt_diff_line(line)?;
            let mut diag = Diagnostic::new(
                Severity::Error,
                format!("{file} is not canonically formatted"),
                DiagnosticSource::Fmt,
            )
            .with_evidence(line.trim().to_string());
            diag.file = Some(file);
            diag.line = line_no;
            Some(diag)
        })
        .collect()
}

/// `thread 'vm::call' panicked at src/vm.rs:10:5:` → ("vm::call", location)
fn parse_panic(line: &str) -> Option<(String, Option<(String, u32, u32)>)> {
    let rest = line.trim().strip_prefix("thread '")?;
    let (name, rest) = rest.split_once('\'')?;
    let at = rest.trim().strip_prefix("panicked at ")?;
    let location = parse_file_line_col(at.trim_end_matches(':'));
    Some((name.to_string(), location))
}

fn parse_tests(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in text.lines() {
        if let Some((name, location)) = parse_panic(line) {
            let mut diag = Diagnostic::new(
                Severity::Error,
                format!("test '{name}' panicked"),
                DiagnosticSource::Test,
            )
            .with_evidence(line.trim().to_string());
            if let Some((file, line_no, column)) = location {
                diag = diag.with_location(file, line_no, column);
            }
            diagnostics.push(diag);
        }
    }
    for name in failed_tests(text) {
        diagnostics.push(
            Diagnostic::new(
                Severity::Error,
                format!("test '{name}' failed"),
                DiagnosticSource::Test,
            )
            .with_code(name),
        );
    }
    diagnostics
}
