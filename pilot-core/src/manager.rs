//! Enumerator and CommandExecutor
//!
//! Both are thin policies over a `ProcessRunner`: build the invocation, run it
//! with the right timeout, classify the outcome. Neither retries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{ControlOp, InteractiveRequest, Invocation, ManagerCommands, UnitAction};
use crate::config::PilotConfig;
use crate::error::{ControlCause, ControlError, ExecutionError};
use crate::filter::Scope;
use crate::parser::parse_list_units;
use crate::runner::{ProcessOutput, ProcessRunner, RunError};
use crate::unit::{UnitRecord, short_name};

/// pkexec: the authentication dialog was dismissed
const ELEVATION_DISMISSED: i32 = 126;
/// pkexec: not authorized, or authentication failed
const ELEVATION_REFUSED: i32 = 127;

/// Runs the list query for a scope
#[derive(Clone)]
pub struct Enumerator {
    runner: Arc<dyn ProcessRunner>,
    commands: ManagerCommands,
    timeout: Duration,
}

impl Enumerator {
    pub fn new(runner: Arc<dyn ProcessRunner>, commands: ManagerCommands, timeout: Duration) -> Self {
        Self {
            runner,
            commands,
            timeout,
        }
    }

    /// Raw listing output for `scope`
    pub async fn list(&self, scope: Scope) -> Result<String, ExecutionError> {
        let invocation = self.commands.list(scope);
        let program = invocation.program().to_string();
        debug!(%invocation, "listing units");

        match self.runner.run(&invocation, self.timeout).await {
            Ok(out) if out.success() => Ok(out.stdout),
            Ok(out) => Err(ExecutionError::Exit {
                program,
                code: out.code,
                stderr: out.diagnostic(),
            }),
            Err(RunError::Spawn(message)) => Err(ExecutionError::Spawn { program, message }),
            Err(RunError::TimedOut(after)) => Err(ExecutionError::TimedOut { program, after }),
        }
    }

    /// List and parse in one step
    pub async fn poll(&self, scope: Scope) -> Result<Vec<UnitRecord>, ExecutionError> {
        let raw = self.list(scope).await?;
        let units = parse_list_units(&raw);
        debug!(scope = %scope, count = units.len(), "parsed listing");
        Ok(units)
    }
}

/// Issues lifecycle and reconfiguration commands
#[derive(Clone)]
pub struct CommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    commands: ManagerCommands,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, commands: ManagerCommands, timeout: Duration) -> Self {
        Self {
            runner,
            commands,
            timeout,
        }
    }

    /// Run `action` against one unit. Success carries no payload; the caller
    /// must re-poll after the settle delay to learn the new state.
    pub async fn execute(&self, action: UnitAction, unit: &str) -> Result<(), ControlError> {
        let unit = short_name(unit);
        let invocation = self.commands.control(action, unit);
        info!(%invocation, "{} {}", action.progressive(), unit);
        self.run(ControlOp::Unit(action), Some(unit), &invocation).await
    }

    /// `daemon-reload`; no unit involved
    pub async fn daemon_reload(&self) -> Result<(), ControlError> {
        let invocation = self.commands.daemon_reload();
        info!(%invocation, "reloading manager configuration");
        self.run(ControlOp::DaemonReload, None, &invocation).await
    }

    pub fn edit_request(&self, unit: &str) -> InteractiveRequest {
        self.commands.edit(short_name(unit))
    }

    pub fn status_request(&self, unit: &str) -> InteractiveRequest {
        self.commands.status(short_name(unit))
    }

    async fn run(
        &self,
        op: ControlOp,
        unit: Option<&str>,
        invocation: &Invocation,
    ) -> Result<(), ControlError> {
        let outcome = self.runner.run(invocation, self.timeout).await;
        let cause = match outcome {
            Ok(out) if out.success() => return Ok(()),
            Ok(out) => classify(&out, invocation.elevated),
            Err(RunError::Spawn(message)) => ControlCause::Spawn { message },
            Err(RunError::TimedOut(after)) => ControlCause::TimedOut { after },
        };
        let err = ControlError {
            op,
            unit: unit.map(str::to_string),
            cause,
        };
        warn!("{}", err);
        Err(err)
    }
}

/// Map a non-zero exit to a cause. The elevation wrapper's own exit codes
/// are only meaningful when it was actually used.
fn classify(out: &ProcessOutput, elevated: bool) -> ControlCause {
    match out.code {
        Some(ELEVATION_DISMISSED) if elevated => ControlCause::ElevationDismissed,
        Some(ELEVATION_REFUSED) if elevated => ControlCause::NotAuthorized {
            stderr: out.diagnostic(),
        },
        code => ControlCause::Exited {
            code,
            stderr: out.diagnostic(),
        },
    }
}

/// Build both halves from one config
pub fn from_config(
    runner: Arc<dyn ProcessRunner>,
    config: &PilotConfig,
    privilege: crate::command::Privilege,
) -> (Enumerator, CommandExecutor) {
    let commands = ManagerCommands::new(config.manager.clone(), config.elevate.clone(), privilege);
    (
        Enumerator::new(runner.clone(), commands.clone(), config.list_timeout()),
        CommandExecutor::new(runner, commands, config.control_timeout()),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;
    use crate::command::Privilege;

    const LISTING: &str = "UNIT LOAD ACTIVE SUB DESCRIPTION\nnginx.service loaded active running \"A web server\"\nsshd.socket loaded active listening SSH\n";

    fn executor(runner: Arc<ScriptedRunner>, privilege: Privilege) -> CommandExecutor {
        let commands = ManagerCommands::new("systemctl", vec!["pkexec".into()], privilege);
        CommandExecutor::new(runner, commands, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_enumerator_parses_listing() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(ProcessOutput::ok(LISTING))));
        let commands = ManagerCommands::new("systemctl", vec![], Privilege::Unprivileged);
        let enumerator = Enumerator::new(runner.clone(), commands, Duration::from_secs(1));

        let units = enumerator.poll(Scope::Running).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].short_name, "nginx");
        assert_eq!(runner.calls()[0].argv[3], "--state=running");
    }

    #[tokio::test]
    async fn test_enumerator_failure_modes() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(ProcessOutput::failed(1, "Failed to connect to bus"))
        }));
        let commands = ManagerCommands::new("systemctl", vec![], Privilege::Root);
        let enumerator = Enumerator::new(runner, commands.clone(), Duration::from_secs(1));
        let err = enumerator.list(Scope::All).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Exit {
                program: "systemctl".into(),
                code: Some(1),
                stderr: "Failed to connect to bus".into(),
            }
        );

        let runner = Arc::new(ScriptedRunner::new(|_| {
            Err(RunError::TimedOut(Duration::from_secs(1)))
        }));
        let enumerator = Enumerator::new(runner, commands, Duration::from_secs(1));
        assert!(matches!(
            enumerator.list(Scope::All).await,
            Err(ExecutionError::TimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_elevates_when_unprivileged() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(ProcessOutput::ok(""))));
        let exec = executor(runner.clone(), Privilege::Unprivileged);

        exec.execute(UnitAction::Stop, "nginx").await.unwrap();
        assert_eq!(
            runner.calls()[0].argv,
            vec!["pkexec", "systemctl", "stop", "nginx.service"]
        );
    }

    #[tokio::test]
    async fn test_execute_accepts_full_name() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(ProcessOutput::ok(""))));
        let exec = executor(runner.clone(), Privilege::Root);

        exec.execute(UnitAction::Restart, "nginx.service").await.unwrap();
        assert_eq!(runner.calls()[0].argv, vec!["systemctl", "restart", "nginx.service"]);
    }

    #[tokio::test]
    async fn test_unknown_unit_is_control_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(ProcessOutput::failed(5, "Failed to stop ghost.service: Unit ghost.service not loaded.\n"))
        }));
        let exec = executor(runner, Privilege::Unprivileged);

        let err = exec.execute(UnitAction::Stop, "ghost").await.unwrap_err();
        assert_eq!(err.op, ControlOp::Unit(UnitAction::Stop));
        assert_eq!(err.unit.as_deref(), Some("ghost"));
        assert_eq!(
            err.cause,
            ControlCause::Exited {
                code: Some(5),
                stderr: "Failed to stop ghost.service: Unit ghost.service not loaded.".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_elevation_failures_classified() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(ProcessOutput::failed(126, ""))));
        let err = executor(runner, Privilege::Unprivileged)
            .execute(UnitAction::Start, "nginx")
            .await
            .unwrap_err();
        assert_eq!(err.cause, ControlCause::ElevationDismissed);

        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(ProcessOutput::failed(127, "Error executing command as another user: Not authorized"))
        }));
        let err = executor(runner, Privilege::Unprivileged)
            .execute(UnitAction::Start, "nginx")
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ControlCause::NotAuthorized { .. }));

        // Same exit code without elevation is just an exit code
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(ProcessOutput::failed(126, "x"))));
        let err = executor(runner, Privilege::Root)
            .execute(UnitAction::Start, "nginx")
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ControlCause::Exited { code: Some(126), .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Err(RunError::Spawn("No such file or directory".into()))
        }));
        let err = executor(runner, Privilege::Root).daemon_reload().await.unwrap_err();
        assert_eq!(err.op, ControlOp::DaemonReload);
        assert_eq!(err.unit, None);
        assert!(matches!(err.cause, ControlCause::Spawn { .. }));
    }
}
