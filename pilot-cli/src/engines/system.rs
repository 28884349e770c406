use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use pilot_core::command::Invocation;
use pilot_core::runner::{ProcessOutput, ProcessRunner, RunError};

/// Runs invocations as real child processes
#[derive(Clone, Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<ProcessOutput, RunError> {
        let Some((program, args)) = invocation.argv.split_first() else {
            return Err(RunError::Spawn("empty command".into()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the output future on timeout must not leave the child behind
        cmd.kill_on_drop(true);

        debug!(%invocation, "spawning");
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(RunError::Spawn(e.to_string())),
            Err(_) => Err(RunError::TimedOut(timeout)),
        }
    }
}
