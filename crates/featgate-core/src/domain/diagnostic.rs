//! Normalized diagnostics captured from job output.

use serde::{Deserialize, Serialize};

use crate::domain::job::Action;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

/// Tool that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Rustc,
    Clippy,
    Fmt,
    Test,
    Setup,
    Custom,
}

impl From<Action> for DiagnosticSource {
    fn from(action: Action) -> Self {
        match action {
            Action::TypeCheck => DiagnosticSource::Rustc,
            Action::FormatCheck => DiagnosticSource::Fmt,
            Action::Lint => DiagnosticSource::Clippy,
            Action::Test => DiagnosticSource::Test,
        }
    }
}

/// A single normalized diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,

    /// Diagnostic/lint code (e.g. "clippy::needless_return", "E0308").
    pub code: Option<String>,

    pub message: String,

    /// Source file path (relative to workspace root).
    pub file: Option<String>,

    /// Line number (1-indexed).
    pub line: Option<u32>,

    /// Column number (1-indexed).
    pub column: Option<u32>,

    pub source: DiagnosticSource,

    /// Raw output line the diagnostic was parsed from.
    pub evidence: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, source: DiagnosticSource) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            source,
            evidence: None,
        }
    }

    pub fn with_location(mut self, file: String, line: u32, column: u32) -> Self {
        self.file = Some(file);
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: String) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_evidence(mut self, evidence: String) -> Self {
        self.evidence = Some(evidence);
        self
    }
}
