use std::path::Path;
use std::sync::Arc;

use pilot_core::command::{ManagerCommands, Privilege};
use pilot_core::config::PilotConfig;
use pilot_core::filter::Scope;
use pilot_core::manager::Enumerator;
use pilot_core::runner::ProcessRunner;

use pilot_cli::launcher::{TerminalLauncher, find_program};

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub async fn run_doctor(
    config_path: Option<&Path>,
    config: &PilotConfig,
    privilege: Privilege,
    runner: Arc<dyn ProcessRunner>,
) -> anyhow::Result<()> {
    println!("svc-pilot doctor\n");

    match config_path {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: built-in defaults"),
    }
    println!("Runner: {}\n", runner.name());

    let mut checks = vec![
        check_privilege(config, privilege),
        check_manager(config),
        check_terminal(config),
    ];
    checks.push(check_listing(config, privilege, runner).await);

    for check in &checks {
        print_check(check);
    }
    println!();

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        println!("All checks passed!");
    } else {
        println!("Issues found:");
        for check in &failed {
            println!("  - {}: {}", check.name, check.message);
            if let Some(hint) = &check.hint {
                println!("    Hint: {}", hint);
            }
        }
    }

    Ok(())
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn check_privilege(config: &PilotConfig, privilege: Privilege) -> Check {
    if privilege.is_root() {
        return Check::ok("privilege", "running as root, commands run directly");
    }

    let Some(wrapper) = config.elevate.first() else {
        return Check::fail("privilege", "unprivileged and no elevation wrapper configured")
            .with_hint("set `elevate: [pkexec]` in the config or run as root");
    };
    match find_program(wrapper, None) {
        Some(path) => Check::ok(
            "privilege",
            format!("unprivileged, commands elevated via {}", path.display()),
        ),
        None => Check::fail("privilege", format!("elevation wrapper `{}` not found", wrapper))
            .with_hint("install polkit (pkexec) or run as root"),
    }
}

fn check_manager(config: &PilotConfig) -> Check {
    match find_program(&config.manager, None) {
        Some(path) => Check::ok("manager", path.display().to_string()),
        None => Check::fail("manager", format!("`{}` not found on PATH", config.manager))
            .with_hint("svc-pilot needs a systemd host; try --demo"),
    }
}

fn check_terminal(config: &PilotConfig) -> Check {
    match TerminalLauncher::from_config(config).resolve() {
        Ok((spec, path)) => Check::ok(
            "terminal",
            format!("{} ({})", spec.program, path.display()),
        ),
        Err(e) => Check::fail("terminal", e.to_string())
            .with_hint("edit and status views need one of the configured terminals"),
    }
}

async fn check_listing(
    config: &PilotConfig,
    privilege: Privilege,
    runner: Arc<dyn ProcessRunner>,
) -> Check {
    let commands = ManagerCommands::new(config.manager.clone(), config.elevate.clone(), privilege);
    let enumerator = Enumerator::new(runner, commands, config.list_timeout());
    match enumerator.poll(Scope::All).await {
        Ok(units) => {
            let failed = units.iter().filter(|u| u.is_failed()).count();
            Check::ok(
                "listing",
                format!("{} services ({} failed)", units.len(), failed),
            )
        }
        Err(e) => Check::fail("listing", e.to_string()),
    }
}
