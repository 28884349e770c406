use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use pilot_core::command::Invocation;
use pilot_core::runner::{ProcessOutput, ProcessRunner, RunError};
use pilot_core::unit::{SERVICE_SUFFIX, short_name};

const VERBS: [&str; 9] = [
    "list-units",
    "start",
    "stop",
    "restart",
    "enable",
    "disable",
    "daemon-reload",
    "status",
    "edit",
];

/// systemctl's "unit not loaded" exit status
const EXIT_NOT_LOADED: i32 = 5;

#[derive(Clone, Debug)]
struct FakeUnit {
    active: String,
    sub: String,
    enabled: bool,
    /// Start attempts fail and leave the unit failed
    broken: bool,
    description: String,
}

impl FakeUnit {
    fn new(active: &str, sub: &str, description: &str) -> Self {
        Self {
            active: active.into(),
            sub: sub.into(),
            enabled: active == "active",
            broken: false,
            description: description.into(),
        }
    }

    fn set(&mut self, active: &str, sub: &str) {
        self.active = active.into();
        self.sub = sub.into();
    }
}

/// In-memory service manager speaking just enough of the systemctl command
/// line for the engine: listing, lifecycle verbs and daemon-reload. Any
/// elevation prefix is ignored.
pub struct FakeManager {
    units: Mutex<BTreeMap<String, FakeUnit>>,
    latency: Duration,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeManager {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(BTreeMap::new()),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A small, plausible machine for `--demo`
    pub fn demo() -> Self {
        Self::new()
            .with_unit("cron", "active", "running", "Regular background program processing daemon")
            .with_unit("cups", "inactive", "dead", "CUPS Scheduler")
            .with_unit("dbus", "active", "running", "D-Bus System Message Bus")
            .with_unit("nginx", "active", "running", "A high performance web server")
            .with_unit("postgresql", "active", "exited", "PostgreSQL RDBMS")
            .with_unit("redis-server", "failed", "failed", "Advanced key-value store")
            .with_unit("ssh", "active", "running", "OpenBSD Secure Shell server")
            .with_broken("redis-server")
            .with_latency(Duration::from_millis(150))
    }

    pub fn with_unit(self, name: &str, active: &str, sub: &str, description: &str) -> Self {
        if let Ok(mut units) = self.units.lock() {
            units.insert(short_name(name).to_string(), FakeUnit::new(active, sub, description));
        }
        self
    }

    /// Make start/restart of `name` fail
    pub fn with_broken(self, name: &str) -> Self {
        if let Ok(mut units) = self.units.lock() {
            if let Some(unit) = units.get_mut(short_name(name)) {
                unit.broken = true;
            }
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `(active, sub)` of a unit
    pub fn state_of(&self, name: &str) -> Option<(String, String)> {
        let units = self.units.lock().ok()?;
        units
            .get(short_name(name))
            .map(|u| (u.active.clone(), u.sub.clone()))
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let units = self.units.lock().ok()?;
        units.get(short_name(name)).map(|u| u.enabled)
    }

    /// Every argv this manager has been asked to run
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn listing(&self, selector: &str) -> String {
        let Ok(units) = self.units.lock() else {
            return String::new();
        };
        let state = selector.strip_prefix("--state=");

        let mut out = String::from("UNIT LOAD ACTIVE SUB DESCRIPTION\n");
        for (name, unit) in units.iter() {
            let keep = match state {
                Some(s) => s == "loaded" || unit.active == s || unit.sub == s,
                None => true,
            };
            if keep {
                out.push_str(&format!(
                    "{}{} loaded {} {} {}\n",
                    name, SERVICE_SUFFIX, unit.active, unit.sub, unit.description
                ));
            }
        }
        out
    }

    fn control(&self, verb: &str, target: Option<&str>) -> ProcessOutput {
        let Some(target) = target else {
            return ProcessOutput::failed(1, format!("Too few arguments for {}.", verb));
        };
        let name = short_name(target);
        let Ok(mut units) = self.units.lock() else {
            return ProcessOutput::failed(1, "manager state poisoned");
        };
        let Some(unit) = units.get_mut(name) else {
            return ProcessOutput::failed(
                EXIT_NOT_LOADED,
                format!(
                    "Failed to {} {}{}: Unit {}{} not loaded.",
                    verb, name, SERVICE_SUFFIX, name, SERVICE_SUFFIX
                ),
            );
        };

        match verb {
            "start" | "restart" if unit.broken => {
                unit.set("failed", "failed");
                ProcessOutput::failed(
                    1,
                    format!(
                        "Job for {}{} failed because the control process exited with error code.",
                        name, SERVICE_SUFFIX
                    ),
                )
            }
            "start" | "restart" => {
                unit.set("active", "running");
                ProcessOutput::ok("")
            }
            "stop" => {
                unit.set("inactive", "dead");
                ProcessOutput::ok("")
            }
            "enable" => {
                unit.enabled = true;
                ProcessOutput::ok("")
            }
            "disable" => {
                unit.enabled = false;
                ProcessOutput::ok("")
            }
            "status" => ProcessOutput::ok(format!(
                "● {}{} - {}\n     Active: {} ({})\n",
                name, SERVICE_SUFFIX, unit.description, unit.active, unit.sub
            )),
            _ => ProcessOutput::ok(""),
        }
    }
}

impl Default for FakeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for FakeManager {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<ProcessOutput, RunError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.argv.clone());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        // Skip the elevation wrapper and manager binary, whatever they are
        let Some(at) = invocation
            .argv
            .iter()
            .position(|a| VERBS.contains(&a.as_str()))
        else {
            return Ok(ProcessOutput::failed(1, "Unknown command verb."));
        };
        let verb = invocation.argv[at].as_str();
        let rest = &invocation.argv[at + 1..];

        let output = match verb {
            "list-units" => {
                let selector = rest
                    .iter()
                    .find(|a| a.as_str() == "--all" || a.starts_with("--state="))
                    .map(String::as_str)
                    .unwrap_or("--all");
                ProcessOutput::ok(self.listing(selector))
            }
            "daemon-reload" => ProcessOutput::ok(""),
            _ => self.control(verb, rest.first().map(String::as_str)),
        };
        Ok(output)
    }
}
