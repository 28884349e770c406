//! Terminal emulator launcher
//!
//! Tries the configured emulators in order and starts the first one found on
//! PATH, detached from our process group so it outlives the TUI.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use pilot_core::command::InteractiveRequest;
use pilot_core::config::{PilotConfig, TerminalSpec, TerminalStyle};
use pilot_core::error::LauncherError;
use pilot_core::launcher::InteractiveLauncher;

const HOLD_PROMPT: &str = "Press Enter to close...";

pub struct TerminalLauncher {
    terminals: Vec<TerminalSpec>,
    /// Overrides `$PATH` for lookups
    search_path: Option<OsString>,
}

impl TerminalLauncher {
    pub fn new(terminals: Vec<TerminalSpec>) -> Self {
        Self {
            terminals,
            search_path: None,
        }
    }

    pub fn from_config(config: &PilotConfig) -> Self {
        Self::new(config.terminals.clone())
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// First configured terminal that exists, with its resolved path
    pub fn resolve(&self) -> Result<(&TerminalSpec, PathBuf), LauncherError> {
        for spec in &self.terminals {
            if let Some(path) = find_program(&spec.program, self.search_path.as_deref()) {
                return Ok((spec, path));
            }
            debug!(program = %spec.program, "terminal not found");
        }
        Err(LauncherError::NoTerminal {
            tried: self.terminals.iter().map(|t| t.program.clone()).collect(),
        })
    }
}

/// The argv run inside the terminal. Views that should stay readable after
/// the command ends wait for Enter.
pub fn session_argv(request: &InteractiveRequest) -> Vec<String> {
    if request.hold_open {
        let script = format!(
            "{}; read -p \"{}\" _",
            request.invocation.command_line(),
            HOLD_PROMPT
        );
        vec!["bash".into(), "-c".into(), script]
    } else {
        request.invocation.argv.clone()
    }
}

/// Full argv for starting `request` in the terminal described by `spec`
pub fn terminal_argv(spec: &TerminalSpec, request: &InteractiveRequest) -> Vec<String> {
    let session = session_argv(request);
    let mut argv = vec![spec.program.clone()];
    argv.extend(spec.args.iter().cloned());
    match spec.style {
        TerminalStyle::Argv => argv.extend(session),
        TerminalStyle::Command => argv.push(
            shlex::try_join(session.iter().map(String::as_str)).unwrap_or_else(|_| session.join(" ")),
        ),
    }
    argv
}

/// Look `program` up like a shell would
pub fn find_program(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }

    let paths = match search_path {
        Some(p) => p.to_os_string(),
        None => std::env::var_os("PATH")?,
    };
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl InteractiveLauncher for TerminalLauncher {
    async fn launch(&self, request: &InteractiveRequest) -> Result<(), LauncherError> {
        let (spec, path) = self.resolve()?;
        let argv = terminal_argv(spec, request);

        let mut cmd = Command::new(&path);
        cmd.args(&argv[1..]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        // New session so closing the TUI does not take the terminal with it
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| LauncherError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;
        info!(terminal = %spec.program, "opened {}", request.title());

        // Reap it whenever it exits
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }
}
