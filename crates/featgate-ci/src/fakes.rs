//! Scripted command runner (testing only)
//!
//! `ScriptedRunner` answers invocations from a list of rules instead of
//! spawning processes and records every invocation it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::Invocation;
use crate::runner::{CommandOutput, CommandRunner, RunnerError};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    response: Result<CommandOutput, RunnerError>,
}

/// Runner that matches the rendered invocation (`program arg ...`) against
/// substring rules. The first matching rule answers; unmatched invocations
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    panics: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a call ends, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations containing `pattern` with `response`.
    pub fn respond(
        mut self,
        pattern: impl Into<String>,
        response: Result<CommandOutput, RunnerError>,
    ) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response,
        });
        self
    }

    /// Answer invocations containing `pattern` with a failing exit code and
    /// the given stdout.
    pub fn fail(self, pattern: impl Into<String>, exit_code: i32, stdout: &str) -> Self {
        self.respond(
            pattern,
            Ok(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                ..CommandOutput::default()
            }),
        )
    }

    /// Panic on invocations containing `pattern`, ahead of any rule.
    pub fn panic_on(mut self, pattern: impl Into<String>) -> Self {
        self.panics.push(pattern.into());
        self
    }

    /// Sleep this long before answering each invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Invocations received so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of received invocations whose rendering contains `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.to_string().contains(pattern))
            .count()
    }

    /// Most invocations that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout_secs: u64,
    ) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rendered = invocation.to_string();
        if let Some(pattern) = self.panics.iter().find(|p| rendered.contains(p.as_str())) {
            panic!("scripted panic on '{pattern}'");
        }
        let response = self
            .rules
            .iter()
            .find(|rule| rendered.contains(&rule.pattern))
            .map(|rule| rule.response.clone())
            .unwrap_or_else(|| Ok(CommandOutput::default()));

        // Scripted timeouts report the limit the caller actually asked for.
        match response {
            Err(RunnerError::Timeout { program, .. }) => Err(RunnerError::Timeout {
                program,
                limit_secs: timeout_secs,
            }),
            other => other,
        }
    }
}
