use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::error::ConfigError;

/// How a terminal emulator expects the command it should run
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStyle {
    /// Command follows as separate argv entries (`gnome-terminal -- cmd args`)
    Argv,
    /// Command is passed as one shell-quoted string (`konsole -e "cmd args"`)
    Command,
}

/// One candidate terminal emulator
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TerminalSpec {
    /// Executable looked up on PATH
    pub program: String,

    #[serde(default = "default_terminal_style")]
    pub style: TerminalStyle,

    /// Arguments placed between the program and the command (e.g. `--`, `-e`)
    #[serde(default)]
    pub args: Vec<String>,
}

impl TerminalSpec {
    pub fn argv(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            style: TerminalStyle::Argv,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn command(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            style: TerminalStyle::Command,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_terminal_style() -> TerminalStyle {
    TerminalStyle::Command
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PilotConfig {
    /// Service manager binary
    #[serde(default = "default_manager")]
    pub manager: String,

    /// Privilege-elevation wrapper prepended when not running as root
    #[serde(default = "default_elevate")]
    pub elevate: Vec<String>,

    /// Wait between a successful command and the re-poll
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_list_timeout")]
    pub list_timeout_ms: u64,

    /// Generous, since elevation prompts wait on the operator
    #[serde(default = "default_control_timeout")]
    pub control_timeout_ms: u64,

    /// Drop poll results that started before the snapshot already on display
    #[serde(default = "default_true")]
    pub supersede_stale_polls: bool,

    /// Terminal emulators in preference order
    #[serde(default = "default_terminals")]
    pub terminals: Vec<TerminalSpec>,

    /// Where the TUI writes its log; logs are discarded in TUI mode otherwise
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_manager() -> String {
    "systemctl".into()
}
fn default_elevate() -> Vec<String> {
    vec!["pkexec".into()]
}
fn default_settle_delay() -> u64 {
    1000
}
fn default_list_timeout() -> u64 {
    15_000
}
fn default_control_timeout() -> u64 {
    120_000
}
fn default_true() -> bool {
    true
}
fn default_terminals() -> Vec<TerminalSpec> {
    vec![
        TerminalSpec::argv("gnome-terminal", &["--"]),
        TerminalSpec::command("xfce4-terminal", &["-e"]),
        TerminalSpec::command("konsole", &["-e"]),
        TerminalSpec::command("x-terminal-emulator", &["-e"]),
    ]
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            manager: default_manager(),
            elevate: default_elevate(),
            settle_delay_ms: default_settle_delay(),
            list_timeout_ms: default_list_timeout(),
            control_timeout_ms: default_control_timeout(),
            supersede_stale_polls: true,
            terminals: default_terminals(),
            log_file: None,
        }
    }
}

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "SVC_PILOT_CONFIG";

impl PilotConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // An empty file is a valid "all defaults" config
        let config: PilotConfig = if content.trim().is_empty() {
            PilotConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Default per-user location: `<config_dir>/svc-pilot/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("svc-pilot").join("config.yaml"))
    }

    /// Resolve the config: explicit path, then `$SVC_PILOT_CONFIG`, then the
    /// default location. A missing default file means built-in defaults; a
    /// missing explicit file is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<(Option<PathBuf>, Self), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Some(path.to_path_buf()), Self::load(path)?));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            return Ok((Some(path.clone()), Self::load(&path)?));
        }

        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Ok((Some(path.clone()), Self::load(&path)?));
            }
        }

        Ok((None, Self::default()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "manager",
                reason: "must name a binary".into(),
            });
        }
        if self.settle_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "settle_delay_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.list_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "list_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.control_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "control_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if let Some(t) = self.terminals.iter().find(|t| t.program.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "terminals",
                reason: format!("terminal entry with empty program (args: {:?})", t.args),
            });
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PilotConfig::from_str("").unwrap();
        assert_eq!(config.manager, "systemctl");
        assert_eq!(config.elevate, vec!["pkexec".to_string()]);
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert!(config.supersede_stale_polls);
        let programs: Vec<_> = config.terminals.iter().map(|t| t.program.as_str()).collect();
        assert_eq!(
            programs,
            vec!["gnome-terminal", "xfce4-terminal", "konsole", "x-terminal-emulator"]
        );
        assert_eq!(config.terminals[0].style, TerminalStyle::Argv);
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
manager: /usr/bin/systemctl
elevate: [sudo, -n]
settle_delay_ms: 250
terminals:
  - program: alacritty
    style: argv
    args: ["-e"]
  - program: xterm
    args: ["-e"]
"#;
        let config = PilotConfig::from_str(yaml).unwrap();
        assert_eq!(config.manager, "/usr/bin/systemctl");
        assert_eq!(config.elevate, vec!["sudo".to_string(), "-n".to_string()]);
        assert_eq!(config.settle_delay_ms, 250);
        assert_eq!(config.list_timeout_ms, 15_000);
        assert_eq!(config.terminals.len(), 2);
        assert_eq!(config.terminals[1].style, TerminalStyle::Command);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = PilotConfig::from_str("settle_delay_ms: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "settle_delay_ms", .. })
        ));

        let result = PilotConfig::from_str("manager: \"\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid { field: "manager", .. })));

        let result = PilotConfig::from_str("terminals:\n  - program: \"\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid { field: "terminals", .. })));
    }

    #[test]
    fn test_bad_yaml() {
        let result = PilotConfig::from_str("settle_delay_ms: [1, 2]\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = PilotConfig::discover(Some(Path::new("/nonexistent/svc-pilot.yaml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
