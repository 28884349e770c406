//! Error taxonomy
//!
//! All errors are terminal where they originate: nothing here is retried.
//! They are `Clone` so they can ride the engine's broadcast channel.

use std::time::Duration;

use thiserror::Error;

use crate::command::ControlOp;

/// The list query failed; the last good snapshot stays on display
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("failed to run `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("`{program}` exited with {}: {stderr}", exit_label(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{program}` timed out after {}s", .after.as_secs_f32())]
    TimedOut { program: String, after: Duration },
}

/// Why a control command failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControlCause {
    #[error("could not start process: {message}")]
    Spawn { message: String },

    #[error("timed out after {}s", .after.as_secs_f32())]
    TimedOut { after: Duration },

    #[error("authentication dialog was dismissed")]
    ElevationDismissed,

    #[error("not authorized: {stderr}")]
    NotAuthorized { stderr: String },

    #[error("exited with {}: {stderr}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },
}

/// A lifecycle or reconfiguration command failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to {op}{}: {cause}", unit_suffix(.unit))]
pub struct ControlError {
    pub op: ControlOp,
    pub unit: Option<String>,
    pub cause: ControlCause,
}

/// No interactive terminal could be started
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LauncherError {
    #[error("no suitable terminal emulator found (tried: {})", .tried.join(", "))]
    NoTerminal { tried: Vec<String> },

    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "signal".to_string(),
    }
}

fn unit_suffix(unit: &Option<String>) -> String {
    match unit {
        Some(u) => format!(" {}", u),
        None => String::new(),
    }
}
