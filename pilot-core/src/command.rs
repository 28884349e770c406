//! Invocation building for the service manager
//!
//! Every external call the engine makes is described by an `Invocation`
//! first; running it is the `ProcessRunner`'s job. Elevation is a plain argv
//! prefix so elevated and unelevated calls share one code path.

use serde::{Deserialize, Serialize};

use crate::filter::Scope;
use crate::unit::full_name;

/// Lifecycle commands that can be issued against one unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl UnitAction {
    /// Verb passed to the manager binary
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }

    /// Progressive form for status lines
    pub fn progressive(&self) -> &'static str {
        match self {
            Self::Start => "Starting",
            Self::Stop => "Stopping",
            Self::Restart => "Restarting",
            Self::Enable => "Enabling",
            Self::Disable => "Disabling",
        }
    }
}

impl std::fmt::Display for UnitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// Anything that changes manager state and may fail with a `ControlError`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlOp {
    Unit(UnitAction),
    DaemonReload,
}

impl std::fmt::Display for ControlOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit(action) => write!(f, "{}", action),
            Self::DaemonReload => write!(f, "daemon-reload"),
        }
    }
}

/// Whether the calling process can talk to the manager directly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    Root,
    Unprivileged,
}

impl Privilege {
    pub fn from_euid(euid: u32) -> Self {
        if euid == 0 { Self::Root } else { Self::Unprivileged }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

/// A fully resolved external command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// True when `argv` starts with the elevation wrapper
    pub elevated: bool,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            elevated: false,
        }
    }

    /// Prefix with the elevation wrapper; no-op for an empty wrapper
    pub fn elevate(mut self, wrapper: &[String]) -> Self {
        if wrapper.is_empty() {
            return self;
        }
        let mut argv = wrapper.to_vec();
        argv.append(&mut self.argv);
        self.argv = argv;
        self.elevated = true;
        self
    }

    /// Elevate only when the caller lacks privilege
    pub fn elevate_if(self, privilege: Privilege, wrapper: &[String]) -> Self {
        match privilege {
            Privilege::Root => self,
            Privilege::Unprivileged => self.elevate(wrapper),
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Shell-quoted single-string form
    pub fn command_line(&self) -> String {
        shlex::try_join(self.argv.iter().map(String::as_str))
            .unwrap_or_else(|_| self.argv.join(" "))
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// What an interactive session is for; lets the launcher decide how to
/// present it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractiveKind {
    /// Override editing; manager state is unknown until a manual refresh
    Edit { unit: String },
    /// Read-only status view
    Status { unit: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractiveRequest {
    pub invocation: Invocation,
    pub kind: InteractiveKind,
    /// Keep the terminal open after the command exits
    pub hold_open: bool,
}

impl InteractiveRequest {
    pub fn unit(&self) -> &str {
        match &self.kind {
            InteractiveKind::Edit { unit } | InteractiveKind::Status { unit } => unit,
        }
    }

    pub fn title(&self) -> String {
        match &self.kind {
            InteractiveKind::Edit { unit } => format!("Edit {}", unit),
            InteractiveKind::Status { unit } => format!("Status of {}", unit),
        }
    }
}

/// Builds manager invocations from configured binary + wrapper
#[derive(Clone, Debug)]
pub struct ManagerCommands {
    pub manager: String,
    pub elevate: Vec<String>,
    pub privilege: Privilege,
}

impl ManagerCommands {
    pub fn new(manager: impl Into<String>, elevate: Vec<String>, privilege: Privilege) -> Self {
        Self {
            manager: manager.into(),
            elevate,
            privilege,
        }
    }

    /// `svcctl list-units --type=service [--all | --state=<scope>] --no-pager --plain`
    pub fn list(&self, scope: Scope) -> Invocation {
        let selector = match scope {
            Scope::All => "--all".to_string(),
            other => format!("--state={}", other.label()),
        };
        Invocation::new([
            self.manager.clone(),
            "list-units".into(),
            "--type=service".into(),
            selector,
            "--no-pager".into(),
            "--plain".into(),
        ])
    }

    /// `[elevate] svcctl <action> <unit>.service`
    pub fn control(&self, action: UnitAction, short_name: &str) -> Invocation {
        Invocation::new([
            self.manager.clone(),
            action.verb().to_string(),
            full_name(short_name),
        ])
        .elevate_if(self.privilege, &self.elevate)
    }

    /// `[elevate] svcctl daemon-reload`
    pub fn daemon_reload(&self) -> Invocation {
        Invocation::new([self.manager.clone(), "daemon-reload".to_string()])
            .elevate_if(self.privilege, &self.elevate)
    }

    /// `elevate svcctl edit <unit>.service`, run interactively
    pub fn edit(&self, short_name: &str) -> InteractiveRequest {
        InteractiveRequest {
            invocation: Invocation::new([
                self.manager.clone(),
                "edit".to_string(),
                full_name(short_name),
            ])
            .elevate(&self.elevate),
            kind: InteractiveKind::Edit {
                unit: short_name.to_string(),
            },
            hold_open: false,
        }
    }

    /// `svcctl status <unit>.service`, never elevated
    pub fn status(&self, short_name: &str) -> InteractiveRequest {
        InteractiveRequest {
            invocation: Invocation::new([
                self.manager.clone(),
                "status".to_string(),
                full_name(short_name),
            ]),
            kind: InteractiveKind::Status {
                unit: short_name.to_string(),
            },
            hold_open: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(privilege: Privilege) -> ManagerCommands {
        ManagerCommands::new("systemctl", vec!["pkexec".into()], privilege)
    }

    #[test]
    fn test_list_invocations() {
        let c = commands(Privilege::Unprivileged);
        assert_eq!(
            c.list(Scope::All).argv,
            vec!["systemctl", "list-units", "--type=service", "--all", "--no-pager", "--plain"]
        );
        assert_eq!(c.list(Scope::Failed).argv[3], "--state=failed");
        assert_eq!(c.list(Scope::Running).argv[3], "--state=running");
        assert_eq!(c.list(Scope::Inactive).argv[3], "--state=inactive");
        assert!(!c.list(Scope::All).elevated);
    }

    #[test]
    fn test_control_elevated_when_unprivileged() {
        let inv = commands(Privilege::Unprivileged).control(UnitAction::Stop, "nginx");
        assert_eq!(inv.argv, vec!["pkexec", "systemctl", "stop", "nginx.service"]);
        assert!(inv.elevated);
        assert_eq!(inv.program(), "pkexec");
    }

    #[test]
    fn test_control_direct_when_root() {
        let inv = commands(Privilege::Root).control(UnitAction::Enable, "ssh");
        assert_eq!(inv.argv, vec!["systemctl", "enable", "ssh.service"]);
        assert!(!inv.elevated);
    }

    #[test]
    fn test_daemon_reload() {
        assert_eq!(
            commands(Privilege::Unprivileged).daemon_reload().argv,
            vec!["pkexec", "systemctl", "daemon-reload"]
        );
    }

    #[test]
    fn test_interactive_requests() {
        let c = commands(Privilege::Unprivileged);
        let edit = c.edit("nginx");
        assert_eq!(edit.invocation.argv, vec!["pkexec", "systemctl", "edit", "nginx.service"]);
        assert!(!edit.hold_open);

        let status = c.status("nginx");
        assert_eq!(status.invocation.argv, vec!["systemctl", "status", "nginx.service"]);
        assert!(!status.invocation.elevated);
        assert!(status.hold_open);
        assert_eq!(status.unit(), "nginx");
    }

    #[test]
    fn test_edit_is_elevated_even_as_root() {
        let edit = commands(Privilege::Root).edit("nginx");
        assert_eq!(edit.invocation.argv, vec!["pkexec", "systemctl", "edit", "nginx.service"]);
        assert!(edit.invocation.elevated);

        let status = commands(Privilege::Root).status("nginx");
        assert!(!status.invocation.elevated);
    }

    #[test]
    fn test_command_line_quotes() {
        let inv = Invocation::new(["systemctl", "status", "my unit.service"]);
        let line = inv.command_line();
        assert_ne!(line, "systemctl status my unit.service");
        assert_eq!(shlex::split(&line), Some(inv.argv.clone()));
    }

    #[test]
    fn test_empty_wrapper_does_not_elevate() {
        let inv = Invocation::new(["systemctl", "stop", "a.service"]).elevate(&[]);
        assert!(!inv.elevated);
        assert_eq!(inv.program(), "systemctl");
    }
}
