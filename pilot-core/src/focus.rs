use serde::{Deserialize, Serialize};

use crate::filter::{Filter, Scope};
use crate::unit::{Snapshot, UnitRecord};

/// Operator context that must survive a snapshot replacement.
///
/// Values are replaced, not mutated in place, whenever the engine publishes
/// a new focus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    /// Short name of the unit whose detail view is open
    pub expanded: Option<String>,
    pub scope: Scope,
    pub query: String,
}

impl FocusState {
    pub fn new(scope: Scope) -> Self {
        Self {
            expanded: None,
            scope,
            query: String::new(),
        }
    }

    pub fn filter(&self) -> Filter {
        Filter::new(self.scope, self.query.clone())
    }

    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }

    /// Expand `unit`, or collapse it if it is already the expanded one.
    /// Only one unit is ever expanded.
    pub fn toggle_expanded(&self, unit: &str) -> Self {
        let expanded = match &self.expanded {
            Some(current) if current == unit => None,
            _ => Some(unit.to_string()),
        };
        Self {
            expanded,
            ..self.clone()
        }
    }

    pub fn with_expanded(&self, unit: Option<String>) -> Self {
        Self {
            expanded: unit,
            ..self.clone()
        }
    }

    pub fn is_expanded(&self, unit: &str) -> bool {
        self.expanded.as_deref() == Some(unit)
    }

    /// Re-resolve this focus against a new snapshot: query and scope carry
    /// over unchanged, the expanded unit survives only if it still exists.
    pub fn carry_forward(&self, snapshot: &Snapshot) -> Self {
        let expanded = self
            .expanded
            .as_ref()
            .filter(|name| snapshot.contains(name))
            .cloned();
        Self {
            expanded,
            scope: self.scope,
            query: self.query.clone(),
        }
    }

    /// Units visible under this focus, in snapshot order
    pub fn visible<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a UnitRecord> {
        self.filter().apply(snapshot)
    }
}
