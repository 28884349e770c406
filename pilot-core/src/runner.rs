//! Process runner trait
//!
//! The engine never spawns processes itself. A `ProcessRunner` takes a fully
//! built `Invocation` and reports how it ended, which keeps elevation,
//! timeouts and parsing testable without a real service manager.

use std::time::Duration;

use async_trait::async_trait;

use crate::command::Invocation;

/// Captured result of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty
    pub fn diagnostic(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// How running an invocation can fail before producing output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// The process could not be started (binary missing, permission, ...)
    Spawn(String),
    /// The process did not finish within the allotted time and was killed
    TimedOut(Duration),
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Human-readable name of this runner
    fn name(&self) -> &'static str;

    /// Run `invocation` to completion, killing it after `timeout`
    async fn run(&self, invocation: &Invocation, timeout: Duration)
    -> Result<ProcessOutput, RunError>;
}
