//! Post-command reconciliation
//!
//! `reconcile` is the pure half: wholesale snapshot replacement plus focus
//! re-resolution. `ReconciliationScheduler` is the timed half: one abortable
//! settle timer per unit, so a newer command on a unit supersedes the older
//! command's pending re-poll instead of racing it.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::filter::Scope;
use crate::focus::FocusState;
use crate::unit::{Snapshot, UnitRecord};

/// Replace the snapshot and thread the operator's focus through it.
///
/// Nothing from the previous snapshot survives; only `previous`'s fields are
/// carried, with the expanded unit dropped if it no longer exists.
pub fn reconcile(
    previous: &FocusState,
    units: Vec<UnitRecord>,
    scope: Scope,
    generation: u64,
) -> (Snapshot, FocusState) {
    let snapshot = Snapshot::new(generation, scope, units);
    let focus = previous.carry_forward(&snapshot);
    (snapshot, focus)
}

/// Identity of one armed settle timer
pub type Ticket = u64;

/// A settle timer that has elapsed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Due {
    pub unit: String,
    pub ticket: Ticket,
}

struct Pending {
    ticket: Ticket,
    due_at: Instant,
    handle: AbortHandle,
}

/// Result of arming a timer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scheduled {
    pub ticket: Ticket,
    /// Ticket of the same unit's timer that this one replaced
    pub superseded: Option<Ticket>,
}

pub struct ReconciliationScheduler {
    delay: Duration,
    next_ticket: Ticket,
    pending: BTreeMap<String, Pending>,
    due_tx: mpsc::UnboundedSender<Due>,
}

impl ReconciliationScheduler {
    /// Create a scheduler; elapsed timers are delivered on the returned
    /// receiver.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<Due>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                next_ticket: 1,
                pending: BTreeMap::new(),
                due_tx,
            },
            due_rx,
        )
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the settle timer for `unit`, aborting any timer already pending
    /// for it. Must be called from within a tokio runtime.
    pub fn schedule(&mut self, unit: &str) -> Scheduled {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let superseded = self.pending.remove(unit).map(|old| {
            old.handle.abort();
            debug!(unit, ticket = old.ticket, "superseded pending reconciliation");
            old.ticket
        });

        let tx = self.due_tx.clone();
        let delay = self.delay;
        let due = Due {
            unit: unit.to_string(),
            ticket,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(due);
        })
        .abort_handle();

        self.pending.insert(
            unit.to_string(),
            Pending {
                ticket,
                due_at: Instant::now() + delay,
                handle,
            },
        );

        Scheduled { ticket, superseded }
    }

    /// Consume an elapsed timer. Returns false for a ticket that was
    /// superseded or cancelled after it fired.
    pub fn fire(&mut self, due: &Due) -> bool {
        match self.pending.get(&due.unit) {
            Some(p) if p.ticket == due.ticket => {
                self.pending.remove(&due.unit);
                true
            }
            _ => false,
        }
    }

    /// Cancel the pending timer for `unit`, if any
    pub fn cancel(&mut self, unit: &str) -> bool {
        match self.pending.remove(unit) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel everything; returns the units whose timers were dropped
    pub fn cancel_all(&mut self) -> Vec<String> {
        let units: Vec<String> = self.pending.keys().cloned().collect();
        for (_, p) in std::mem::take(&mut self.pending) {
            p.handle.abort();
        }
        units
    }

    pub fn is_pending(&self, unit: &str) -> bool {
        self.pending.contains_key(unit)
    }

    /// Units with an armed timer and the time left on each
    pub fn pending(&self) -> Vec<(String, Duration)> {
        let now = Instant::now();
        self.pending
            .iter()
            .map(|(unit, p)| (unit.clone(), p.due_at.saturating_duration_since(now)))
            .collect()
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        for p in self.pending.values() {
            p.handle.abort();
        }
    }
}
