//! Unit model for svc-pilot
//!
//! A `UnitRecord` is one poll's view of one service unit. A `Snapshot` is the
//! full ordered sequence produced by a single poll; it is never mutated, only
//! replaced by the next one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::filter::Scope;

/// Suffix the service manager appends to service-type unit names
pub const SERVICE_SUFFIX: &str = ".service";

/// Short unit name as shown to the operator (suffix stripped)
pub type UnitName = String;

/// Build the canonical unit name used for control-plane invocations.
///
/// A name that already carries the suffix is returned unchanged.
pub fn full_name(short_name: &str) -> String {
    if short_name.ends_with(SERVICE_SUFFIX) {
        short_name.to_string()
    } else {
        format!("{}{}", short_name, SERVICE_SUFFIX)
    }
}

/// Strip the service suffix, if present
pub fn short_name(full_name: &str) -> &str {
    full_name.strip_suffix(SERVICE_SUFFIX).unwrap_or(full_name)
}

/// One snapshot of one service unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Identity for display, filtering and focus tracking
    pub short_name: UnitName,
    /// Identity for control invocations
    pub full_name: String,
    /// e.g. loaded, not-found, masked
    pub load_state: String,
    /// e.g. active, inactive, failed, activating
    pub active_state: String,
    /// e.g. running, dead, exited, auto-restart
    pub sub_state: String,
    #[serde(default)]
    pub description: String,
}

impl UnitRecord {
    /// Build a record from a suffixed unit name. Returns `None` for units
    /// that are not services.
    pub fn from_full_name(
        full: &str,
        load_state: impl Into<String>,
        active_state: impl Into<String>,
        sub_state: impl Into<String>,
        description: impl Into<String>,
    ) -> Option<Self> {
        let short = full.strip_suffix(SERVICE_SUFFIX)?;
        Some(Self {
            short_name: short.to_string(),
            full_name: full.to_string(),
            load_state: load_state.into(),
            active_state: active_state.into(),
            sub_state: sub_state.into(),
            description: description.into(),
        })
    }

    /// Combined "active (sub)" text, the string filters and search scan
    pub fn status_text(&self) -> String {
        format!("{} ({})", self.active_state, self.sub_state)
    }

    pub fn is_running(&self) -> bool {
        self.sub_state.eq_ignore_ascii_case("running")
    }

    pub fn is_failed(&self) -> bool {
        self.active_state.eq_ignore_ascii_case("failed")
    }
}

/// The full ordered sequence of units produced by one successful poll
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    /// Monotonic per engine run; later polls get larger numbers
    pub generation: u64,
    /// Scope the manager was queried with
    pub scope: Scope,
    pub units: Vec<UnitRecord>,
}

/// Snapshots are shared read-only between the engine and its consumers
pub type SharedSnapshot = Arc<Snapshot>;

impl Snapshot {
    pub fn new(generation: u64, scope: Scope, units: Vec<UnitRecord>) -> Self {
        Self {
            generation,
            scope,
            units,
        }
    }

    /// An empty snapshot, used before the first poll lands
    pub fn empty(scope: Scope) -> Self {
        Self::new(0, scope, Vec::new())
    }

    pub fn get(&self, short_name: &str) -> Option<&UnitRecord> {
        self.units.iter().find(|u| u.short_name == short_name)
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.get(short_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Short names in enumeration order
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.short_name.as_str()).collect()
    }

    /// (running, failed, total) counts for header display
    pub fn counts(&self) -> (usize, usize, usize) {
        let running = self.units.iter().filter(|u| u.is_running()).count();
        let failed = self.units.iter().filter(|u| u.is_failed()).count();
        (running, failed, self.units.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_round_trip() {
        for name in ["nginx", "ssh", "user@1000", "getty@tty1", "systemd-journald"] {
            let full = full_name(name);
            assert_eq!(full, format!("{}.service", name));
            assert_eq!(short_name(&full), name);
        }
    }

    #[test]
    fn test_full_name_not_suffixed_twice() {
        assert_eq!(full_name("nginx.service"), "nginx.service");
    }

    #[test]
    fn test_from_full_name_rejects_other_unit_types() {
        assert!(UnitRecord::from_full_name("dev-sda.device", "loaded", "active", "plugged", "").is_none());
        assert!(UnitRecord::from_full_name("sshd.socket", "loaded", "active", "listening", "").is_none());

        let rec =
            UnitRecord::from_full_name("nginx.service", "loaded", "active", "running", "web").unwrap();
        assert_eq!(rec.short_name, "nginx");
        assert_eq!(rec.full_name, format!("{}{}", rec.short_name, SERVICE_SUFFIX));
    }

    #[test]
    fn test_status_text() {
        let rec = UnitRecord::from_full_name("cups.service", "loaded", "activating", "auto-restart", "")
            .unwrap();
        assert_eq!(rec.status_text(), "activating (auto-restart)");
        assert!(!rec.is_running());
    }

    #[test]
    fn test_snapshot_lookup_and_counts() {
        let units = vec![
            UnitRecord::from_full_name("a.service", "loaded", "active", "running", "").unwrap(),
            UnitRecord::from_full_name("b.service", "loaded", "failed", "failed", "").unwrap(),
            UnitRecord::from_full_name("c.service", "loaded", "inactive", "dead", "").unwrap(),
        ];
        let snap = Snapshot::new(3, Scope::All, units);

        assert!(snap.contains("b"));
        assert!(!snap.contains("b.service"));
        assert_eq!(snap.names(), vec!["a", "b", "c"]);
        assert_eq!(snap.counts(), (1, 1, 3));
    }
}
