use serde::{Deserialize, Serialize};

use crate::unit::{Snapshot, UnitRecord};

/// Status-based restriction, used both for the manager query and for
/// client-side filtering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    All,
    Running,
    Inactive,
    Failed,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::All, Scope::Running, Scope::Inactive, Scope::Failed];

    pub fn cycle(self) -> Self {
        match self {
            Self::All => Self::Running,
            Self::Running => Self::Inactive,
            Self::Inactive => Self::Failed,
            Self::Failed => Self::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Running => "running",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
        }
    }

    /// Substring the lowercased status text must contain, `None` for `All`
    fn needle(&self) -> Option<&'static str> {
        match self {
            Self::All => None,
            other => Some(other.label()),
        }
    }

    /// Scope predicate: substring match on the combined status text, not
    /// exact state equality.
    pub fn matches(&self, unit: &UnitRecord) -> bool {
        match self.needle() {
            None => true,
            Some(needle) => unit.status_text().to_lowercase().contains(needle),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "running" => Ok(Self::Running),
            "inactive" => Ok(Self::Inactive),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "unknown scope '{}', expected one of: all, running, inactive, failed",
                other
            )),
        }
    }
}

/// Search predicate: empty query matches everything, otherwise a
/// case-insensitive substring of the short name or of the status text.
pub fn search_matches(unit: &UnitRecord, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let q = query.to_lowercase();
    unit.short_name.to_lowercase().contains(&q) || unit.status_text().to_lowercase().contains(&q)
}

/// Final visibility of a unit under a query and scope
pub fn visible(unit: &UnitRecord, query: &str, scope: Scope) -> bool {
    scope.matches(unit) && search_matches(unit, query)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub scope: Scope,
    pub query: String,
}

impl Filter {
    pub fn new(scope: Scope, query: impl Into<String>) -> Self {
        Self {
            scope,
            query: query.into(),
        }
    }

    pub fn matches(&self, unit: &UnitRecord) -> bool {
        visible(unit, &self.query, self.scope)
    }

    /// Visible units, in snapshot order
    pub fn apply<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a UnitRecord> {
        snapshot.units.iter().filter(|u| self.matches(u)).collect()
    }

    pub fn label(&self) -> String {
        if self.query.is_empty() {
            self.scope.label().to_uppercase()
        } else {
            format!("{} /{}/", self.scope.label().to_uppercase(), self.query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, active: &str, sub: &str) -> UnitRecord {
        UnitRecord::from_full_name(&format!("{}.service", name), "loaded", active, sub, "")
            .unwrap()
    }

    #[test]
    fn test_all_scope_empty_query_shows_everything() {
        for u in [
            unit("a", "active", "running"),
            unit("b", "inactive", "dead"),
            unit("c", "failed", "failed"),
            unit("d", "activating", "start-pre"),
        ] {
            assert!(visible(&u, "", Scope::All));
        }
    }

    #[test]
    fn test_scope_matching() {
        let nginx = unit("nginx", "active", "running");
        assert!(visible(&nginx, "", Scope::Running));
        assert!(!visible(&nginx, "", Scope::Failed));
        assert!(!visible(&nginx, "", Scope::Inactive));

        let dead = unit("old", "inactive", "dead");
        assert!(visible(&dead, "", Scope::Inactive));
        assert!(!visible(&dead, "", Scope::Running));
    }

    #[test]
    fn test_failed_scope_matches_substring_of_sub_state() {
        let u = unit("cups", "activating", "auto-restart (failed)");
        assert!(visible(&u, "", Scope::Failed));
        assert!(!visible(&u, "", Scope::Running));
    }

    #[test]
    fn test_search_is_case_insensitive_over_name_and_status() {
        let u = unit("NetworkManager", "active", "running");
        assert!(visible(&u, "network", Scope::All));
        assert!(visible(&u, "RUNNING", Scope::All));
        assert!(!visible(&u, "ssh", Scope::All));
        assert!(!visible(&u, "network", Scope::Failed));
    }

    #[test]
    fn test_search_ignores_description() {
        let u = UnitRecord::from_full_name("nginx.service", "loaded", "active", "running", "web server")
            .unwrap();
        assert!(!search_matches(&u, "web"));
        assert!(search_matches(&u, "ngi"));
    }

    #[test]
    fn test_predicates_commute() {
        let units = [
            unit("nginx", "active", "running"),
            unit("ssh", "inactive", "dead"),
            unit("cups", "failed", "failed"),
        ];
        for u in &units {
            for scope in Scope::ALL {
                for q in ["", "ss", "fail", "run", "zzz"] {
                    let a = scope.matches(u) && search_matches(u, q);
                    let b = search_matches(u, q) && scope.matches(u);
                    assert_eq!(a, b);
                    assert_eq!(visible(u, q, scope), visible(u, q, scope));
                }
            }
        }
    }

    #[test]
    fn test_scope_cycle_and_parse() {
        assert_eq!(Scope::All.cycle().cycle().cycle().cycle(), Scope::All);
        assert_eq!("Failed".parse::<Scope>(), Ok(Scope::Failed));
        assert!("bogus".parse::<Scope>().is_err());
    }

    #[test]
    fn test_filter_apply_preserves_order() {
        let snap = Snapshot::new(
            1,
            Scope::All,
            vec![
                unit("zeta", "active", "running"),
                unit("alpha", "inactive", "dead"),
                unit("mid", "active", "running"),
            ],
        );
        let f = Filter::new(Scope::Running, "");
        let names: Vec<_> = f.apply(&snap).iter().map(|u| u.short_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "mid"]);
        assert_eq!(Filter::new(Scope::Failed, "db").label(), "FAILED /db/");
    }
}
