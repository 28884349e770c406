use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::command::{ControlOp, InteractiveKind};
use crate::error::{ControlError, ExecutionError, LauncherError};
use crate::filter::Scope;
use crate::focus::FocusState;
use crate::reconcile::Ticket;
use crate::unit::{SharedSnapshot, Snapshot, UnitRecord};

/// Why a poll was started
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollCause {
    Initial,
    Refresh,
    ScopeChanged,
    DaemonReload,
    /// Settle timer for a unit elapsed after a successful command
    Reconcile { unit: String },
}

/// Why a finished poll was not applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The operator switched scope while the poll was running
    ScopeChanged,
    /// A poll started later has already been applied
    Stale,
    /// Aborted in flight because a later poll was applied first
    Superseded,
}

#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A whole new snapshot, and the focus re-resolved against it
    SnapshotReplaced {
        snapshot: SharedSnapshot,
        focus: FocusState,
        cause: PollCause,
    },
    /// Focus changed without a new snapshot (query, expansion, scope)
    FocusChanged {
        focus: FocusState,
    },
    PollStarted {
        poll: u64,
        scope: Scope,
        cause: PollCause,
    },
    PollDiscarded {
        poll: u64,
        reason: DiscardReason,
        cause: PollCause,
    },
    EnumerationFailed {
        error: ExecutionError,
        cause: PollCause,
    },
    CommandStarted {
        op: ControlOp,
        unit: Option<String>,
    },
    CommandSucceeded {
        op: ControlOp,
        unit: Option<String>,
    },
    CommandFailed {
        error: ControlError,
    },
    ReconciliationScheduled {
        unit: String,
        ticket: Ticket,
        delay: Duration,
    },
    ReconciliationCancelled {
        unit: String,
        ticket: Ticket,
    },
    InteractiveLaunched {
        kind: InteractiveKind,
    },
    LaunchFailed {
        kind: InteractiveKind,
        error: LauncherError,
    },
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: EngineEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A line of operator feedback
#[derive(Clone, Debug)]
pub struct Notice {
    pub at: SystemTime,
    pub level: NoticeLevel,
    pub text: String,
}

/// Maximum number of notices to keep
const MAX_NOTICES: usize = 100;

/// Presentation-side state, folded from engine events
#[derive(Debug)]
pub struct ViewState {
    pub snapshot: SharedSnapshot,
    pub focus: FocusState,
    pub notices: VecDeque<Notice>,
    /// Units with a command in flight
    pub busy: BTreeSet<String>,
    /// Units with a pending settle timer or a reconcile poll in flight
    pub reconciling: BTreeSet<String>,
    /// A poll is running
    pub loading: bool,
    pub last_event_id: u64,
    settling: BTreeSet<String>,
    reconcile_polls: BTreeMap<String, usize>,
}

impl ViewState {
    pub fn new(focus: FocusState) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty(focus.scope)),
            focus,
            notices: VecDeque::new(),
            busy: BTreeSet::new(),
            reconciling: BTreeSet::new(),
            loading: false,
            last_event_id: 0,
            settling: BTreeSet::new(),
            reconcile_polls: BTreeMap::new(),
        }
    }

    /// Units visible under the current focus
    pub fn visible(&self) -> Vec<&UnitRecord> {
        self.focus.visible(&self.snapshot)
    }

    pub fn last_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    /// A reconcile poll landed, failed or was dropped
    fn reconcile_poll_ended(&mut self, cause: &PollCause) {
        if let PollCause::Reconcile { unit } = cause {
            if let Some(n) = self.reconcile_polls.get_mut(unit) {
                *n -= 1;
                if *n == 0 {
                    self.reconcile_polls.remove(unit);
                }
            }
        }
    }

    fn refresh_reconciling(&mut self) {
        self.reconciling = self
            .settling
            .iter()
            .chain(self.reconcile_polls.keys())
            .cloned()
            .collect();
    }

    fn notify(&mut self, at: SystemTime, level: NoticeLevel, text: String) {
        self.notices.push_back(Notice { at, level, text });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }
}

fn op_label(op: &ControlOp, unit: &Option<String>) -> String {
    match unit {
        Some(u) => format!("{} {}", op, u),
        None => op.to_string(),
    }
}

fn kind_label(kind: &InteractiveKind) -> String {
    match kind {
        InteractiveKind::Edit { unit } => format!("edit {}", unit),
        InteractiveKind::Status { unit } => format!("status {}", unit),
    }
}

pub fn reduce(state: &mut ViewState, env: &EventEnvelope) {
    state.last_event_id = env.id;

    match &env.event {
        EngineEvent::SnapshotReplaced {
            snapshot,
            focus,
            cause,
        } => {
            // Single assignment: readers see the old or the new snapshot, never a mix
            state.snapshot = snapshot.clone();
            state.focus = focus.clone();
            state.loading = false;
            state.reconcile_poll_ended(cause);
        }
        EngineEvent::FocusChanged { focus } => {
            state.focus = focus.clone();
        }
        EngineEvent::PollStarted { cause, .. } => {
            state.loading = true;
            // The settle timer fired; the marker now follows the poll
            if let PollCause::Reconcile { unit } = cause {
                state.settling.remove(unit);
                *state.reconcile_polls.entry(unit.clone()).or_default() += 1;
            }
        }
        EngineEvent::PollDiscarded { cause, .. } => {
            state.reconcile_poll_ended(cause);
        }
        EngineEvent::EnumerationFailed { error, cause } => {
            state.loading = false;
            state.reconcile_poll_ended(cause);
            state.notify(env.at, NoticeLevel::Error, format!("Failed to load services: {}", error));
        }
        EngineEvent::CommandStarted { op, unit } => {
            if let Some(u) = unit {
                state.busy.insert(u.clone());
            }
            state.notify(env.at, NoticeLevel::Info, format!("{}...", op_label(op, unit)));
        }
        EngineEvent::CommandSucceeded { op, unit } => {
            if let Some(u) = unit {
                state.busy.remove(u);
            }
            state.notify(env.at, NoticeLevel::Info, format!("{}: ok", op_label(op, unit)));
        }
        EngineEvent::CommandFailed { error } => {
            if let Some(u) = &error.unit {
                state.busy.remove(u);
            }
            state.notify(env.at, NoticeLevel::Error, error.to_string());
        }
        EngineEvent::ReconciliationScheduled { unit, .. } => {
            state.settling.insert(unit.clone());
        }
        EngineEvent::ReconciliationCancelled { unit, .. } => {
            state.settling.remove(unit);
        }
        EngineEvent::InteractiveLaunched { kind } => {
            state.notify(env.at, NoticeLevel::Info, format!("opened {}", kind_label(kind)));
        }
        EngineEvent::LaunchFailed { kind, error } => {
            state.notify(
                env.at,
                NoticeLevel::Error,
                format!("Failed to {}: {}", kind_label(kind), error),
            );
        }
    }

    state.refresh_reconciling();
}
