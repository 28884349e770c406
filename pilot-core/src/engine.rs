use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::command::{ControlOp, InteractiveRequest, Privilege, UnitAction};
use crate::config::PilotConfig;
use crate::error::{ControlError, ExecutionError, LauncherError};
use crate::filter::Scope;
use crate::focus::FocusState;
use crate::launcher::InteractiveLauncher;
use crate::manager::{self, CommandExecutor, Enumerator};
use crate::reconcile::{Due, ReconciliationScheduler, reconcile};
use crate::reducer::{DiscardReason, EngineEvent, EventEnvelope, PollCause};
use crate::runner::ProcessRunner;
use crate::unit::{SharedSnapshot, Snapshot, UnitRecord};

/// Operations the presentation layer can request
#[derive(Clone, Debug)]
pub enum EngineRequest {
    /// Re-poll under the current scope
    Refresh,
    /// Switch scope; re-polls the manager with the new restriction
    SetScope { scope: Scope },
    /// Replace the free-text query
    SetQuery { query: String },
    /// Expand a unit's detail view, or collapse it if already expanded
    ToggleExpanded { unit: String },
    Collapse,
    /// Run a lifecycle command against one unit
    Control { action: UnitAction, unit: String },
    /// Reload the manager's unit files
    DaemonReload,
    /// Open an elevated override editor for a unit
    Edit { unit: String },
    /// Open a read-only status view for a unit
    ShowStatus { unit: String },
    /// Cancel timers and in-flight work, then stop
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub settle_delay: Duration,
    /// Drop poll results that started before the snapshot on display
    pub supersede_stale_polls: bool,
    pub initial_focus: FocusState,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            supersede_stale_polls: true,
            initial_focus: FocusState::default(),
        }
    }
}

/// Results reported back to the loop by spawned work
enum Internal {
    PollFinished {
        poll: u64,
        scope: Scope,
        cause: PollCause,
        result: Result<Vec<UnitRecord>, ExecutionError>,
    },
    ControlFinished {
        op: ControlOp,
        unit: Option<String>,
        result: Result<(), ControlError>,
    },
    LaunchFinished {
        request: InteractiveRequest,
        result: Result<(), LauncherError>,
    },
}

/// The synchronization and control engine.
///
/// Owns the current snapshot and focus. All external calls run in spawned
/// tasks; the loop itself never blocks on a process.
pub struct Engine {
    enumerator: Enumerator,
    executor: CommandExecutor,
    launcher: Arc<dyn InteractiveLauncher>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        enumerator: Enumerator,
        executor: CommandExecutor,
        launcher: Arc<dyn InteractiveLauncher>,
        options: EngineOptions,
    ) -> Self {
        Self {
            enumerator,
            executor,
            launcher,
            options,
        }
    }

    pub fn from_config(
        runner: Arc<dyn ProcessRunner>,
        launcher: Arc<dyn InteractiveLauncher>,
        config: &PilotConfig,
        privilege: Privilege,
        initial_focus: FocusState,
    ) -> Self {
        let (enumerator, executor) = manager::from_config(runner, config, privilege);
        Self::new(
            enumerator,
            executor,
            launcher,
            EngineOptions {
                settle_delay: config.settle_delay(),
                supersede_stale_polls: config.supersede_stale_polls,
                initial_focus,
            },
        )
    }

    /// Spawn the engine loop. Subscribe to `event_tx` before calling this to
    /// see the initial snapshot.
    pub fn spawn(self, event_tx: broadcast::Sender<EventEnvelope>) -> (EngineHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineRequest>(100);
        let join = tokio::spawn(self.run(cmd_rx, event_tx));
        (EngineHandle { cmd_tx }, join)
    }

    /// Run the engine's main loop.
    ///
    /// 1. Start the initial poll under the initial focus' scope
    /// 2. Process requests from `command_rx` and results from spawned work
    /// 3. Emit every state change as an `EngineEvent` on `event_tx`
    /// 4. Return on `Shutdown` or when the request channel closes
    pub async fn run(
        self,
        mut command_rx: mpsc::Receiver<EngineRequest>,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) {
        let (scheduler, mut due_rx) = ReconciliationScheduler::new(self.options.settle_delay);
        let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();

        let mut session = Session {
            focus: self.options.initial_focus.clone(),
            snapshot: Arc::new(Snapshot::empty(self.options.initial_focus.scope)),
            next_event_id: 1,
            next_generation: 1,
            next_poll: 1,
            applied_poll: 0,
            inflight: BTreeMap::new(),
            scheduler,
            internal_tx,
            event_tx,
            engine: &self,
        };

        session.start_poll(PollCause::Initial);

        loop {
            tokio::select! {
                maybe_cmd = command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    if matches!(cmd, EngineRequest::Shutdown) {
                        break;
                    }
                    session.handle_request(cmd);
                }

                Some(msg) = internal_rx.recv() => {
                    session.handle_internal(msg);
                }

                Some(due) = due_rx.recv() => {
                    session.handle_due(due);
                }
            }
        }

        session.shutdown();
        info!("engine stopped");
    }
}

struct InFlight {
    handle: AbortHandle,
    cause: PollCause,
}

/// Mutable loop state; lives only inside `Engine::run`
struct Session<'a> {
    focus: FocusState,
    snapshot: SharedSnapshot,
    next_event_id: u64,
    next_generation: u64,
    next_poll: u64,
    /// Poll number of the snapshot on display
    applied_poll: u64,
    inflight: BTreeMap<u64, InFlight>,
    scheduler: ReconciliationScheduler,
    internal_tx: mpsc::UnboundedSender<Internal>,
    event_tx: broadcast::Sender<EventEnvelope>,
    engine: &'a Engine,
}

impl Session<'_> {
    fn emit(&mut self, event: EngineEvent) {
        let _ = self.event_tx.send(EventEnvelope {
            id: self.next_event_id,
            at: SystemTime::now(),
            event,
        });
        self.next_event_id += 1;
    }

    fn set_focus(&mut self, focus: FocusState) {
        if focus != self.focus {
            self.focus = focus;
            self.emit(EngineEvent::FocusChanged {
                focus: self.focus.clone(),
            });
        }
    }

    fn handle_request(&mut self, cmd: EngineRequest) {
        match cmd {
            EngineRequest::Refresh => self.start_poll(PollCause::Refresh),

            EngineRequest::SetScope { scope } => {
                if scope != self.focus.scope {
                    self.set_focus(self.focus.with_scope(scope));
                    self.start_poll(PollCause::ScopeChanged);
                }
            }

            EngineRequest::SetQuery { query } => {
                self.set_focus(self.focus.with_query(query));
            }

            EngineRequest::ToggleExpanded { unit } => {
                if self.snapshot.contains(&unit) || self.focus.is_expanded(&unit) {
                    self.set_focus(self.focus.toggle_expanded(&unit));
                } else {
                    debug!(unit, "ignoring expand of unknown unit");
                }
            }

            EngineRequest::Collapse => self.set_focus(self.focus.with_expanded(None)),

            EngineRequest::Control { action, unit } => self.start_control(action, unit),

            EngineRequest::DaemonReload => {
                let op = ControlOp::DaemonReload;
                self.emit(EngineEvent::CommandStarted { op, unit: None });
                let executor = self.engine.executor.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = executor.daemon_reload().await;
                    let _ = tx.send(Internal::ControlFinished {
                        op,
                        unit: None,
                        result,
                    });
                });
            }

            EngineRequest::Edit { unit } => {
                let request = self.engine.executor.edit_request(&unit);
                self.start_launch(request);
            }

            EngineRequest::ShowStatus { unit } => {
                let request = self.engine.executor.status_request(&unit);
                self.start_launch(request);
            }

            EngineRequest::Shutdown => {}
        }
    }

    fn start_control(&mut self, action: UnitAction, unit: String) {
        let op = ControlOp::Unit(action);
        let unit = crate::unit::short_name(&unit).to_string();
        self.emit(EngineEvent::CommandStarted {
            op,
            unit: Some(unit.clone()),
        });

        let executor = self.engine.executor.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = executor.execute(action, &unit).await;
            let _ = tx.send(Internal::ControlFinished {
                op,
                unit: Some(unit),
                result,
            });
        });
    }

    fn start_launch(&mut self, request: InteractiveRequest) {
        let launcher = self.engine.launcher.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = launcher.launch(&request).await;
            let _ = tx.send(Internal::LaunchFinished { request, result });
        });
    }

    /// Poll the manager under the *current* scope
    fn start_poll(&mut self, cause: PollCause) {
        let poll = self.next_poll;
        self.next_poll += 1;
        let scope = self.focus.scope;

        self.emit(EngineEvent::PollStarted {
            poll,
            scope,
            cause: cause.clone(),
        });

        let enumerator = self.engine.enumerator.clone();
        let tx = self.internal_tx.clone();
        let task_cause = cause.clone();
        let handle = tokio::spawn(async move {
            let result = enumerator.poll(scope).await;
            let _ = tx.send(Internal::PollFinished {
                poll,
                scope,
                cause: task_cause,
                result,
            });
        })
        .abort_handle();

        self.inflight.insert(poll, InFlight { handle, cause });
    }

    fn handle_due(&mut self, due: Due) {
        if self.scheduler.fire(&due) {
            debug!(unit = %due.unit, ticket = due.ticket, "settle delay elapsed");
            self.start_poll(PollCause::Reconcile { unit: due.unit });
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::PollFinished {
                poll,
                scope,
                cause,
                result,
            } => {
                // Already reported as superseded
                if self.inflight.remove(&poll).is_none() {
                    return;
                }
                match result {
                    Ok(units) => self.apply_poll(poll, scope, cause, units),
                    Err(error) => {
                        warn!("{}", error);
                        self.emit(EngineEvent::EnumerationFailed { error, cause });
                    }
                }
            }

            Internal::ControlFinished { op, unit, result } => match result {
                Ok(()) => {
                    self.emit(EngineEvent::CommandSucceeded {
                        op,
                        unit: unit.clone(),
                    });
                    match (op, unit) {
                        (ControlOp::Unit(_), Some(unit)) => self.schedule_reconcile(&unit),
                        _ => self.start_poll(PollCause::DaemonReload),
                    }
                }
                Err(error) => self.emit(EngineEvent::CommandFailed { error }),
            },

            Internal::LaunchFinished { request, result } => match result {
                Ok(()) => self.emit(EngineEvent::InteractiveLaunched { kind: request.kind }),
                Err(error) => {
                    warn!("{}", error);
                    self.emit(EngineEvent::LaunchFailed {
                        kind: request.kind,
                        error,
                    });
                }
            },
        }
    }

    fn schedule_reconcile(&mut self, unit: &str) {
        let scheduled = self.scheduler.schedule(unit);
        if let Some(ticket) = scheduled.superseded {
            self.emit(EngineEvent::ReconciliationCancelled {
                unit: unit.to_string(),
                ticket,
            });
        }
        self.emit(EngineEvent::ReconciliationScheduled {
            unit: unit.to_string(),
            ticket: scheduled.ticket,
            delay: self.scheduler.delay(),
        });
    }

    fn apply_poll(&mut self, poll: u64, scope: Scope, cause: PollCause, units: Vec<UnitRecord>) {
        if scope != self.focus.scope {
            debug!(poll, %scope, "discarding poll for a previous scope");
            self.emit(EngineEvent::PollDiscarded {
                poll,
                reason: DiscardReason::ScopeChanged,
                cause,
            });
            return;
        }

        let supersede = self.engine.options.supersede_stale_polls;
        if supersede && poll < self.applied_poll {
            debug!(poll, applied = self.applied_poll, "discarding stale poll");
            self.emit(EngineEvent::PollDiscarded {
                poll,
                reason: DiscardReason::Stale,
                cause,
            });
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let (snapshot, focus) = reconcile(&self.focus, units, scope, generation);

        self.snapshot = Arc::new(snapshot);
        self.focus = focus;
        self.applied_poll = poll;
        self.emit(EngineEvent::SnapshotReplaced {
            snapshot: self.snapshot.clone(),
            focus: self.focus.clone(),
            cause,
        });

        if supersede {
            let older: Vec<u64> = self.inflight.range(..poll).map(|(id, _)| *id).collect();
            for id in older {
                if let Some(f) = self.inflight.remove(&id) {
                    f.handle.abort();
                    self.emit(EngineEvent::PollDiscarded {
                        poll: id,
                        reason: DiscardReason::Superseded,
                        cause: f.cause,
                    });
                }
            }
        }
    }

    fn shutdown(&mut self) {
        for unit in self.scheduler.cancel_all() {
            debug!(unit, "cancelled pending reconciliation on shutdown");
        }
        for (_, f) in std::mem::take(&mut self.inflight) {
            f.handle.abort();
        }
    }
}

/// Cheap, cloneable handle the presentation layer uses to talk to the engine
#[derive(Clone, Debug)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Send a request; returns false once the engine has stopped
    pub async fn send(&self, request: EngineRequest) -> bool {
        self.cmd_tx.send(request).await.is_ok()
    }

    pub async fn refresh(&self) -> bool {
        self.send(EngineRequest::Refresh).await
    }

    pub async fn set_scope(&self, scope: Scope) -> bool {
        self.send(EngineRequest::SetScope { scope }).await
    }

    pub async fn set_query(&self, query: impl Into<String>) -> bool {
        self.send(EngineRequest::SetQuery {
            query: query.into(),
        })
        .await
    }

    pub async fn toggle_expanded(&self, unit: impl Into<String>) -> bool {
        self.send(EngineRequest::ToggleExpanded { unit: unit.into() })
            .await
    }

    pub async fn control(&self, action: UnitAction, unit: impl Into<String>) -> bool {
        self.send(EngineRequest::Control {
            action,
            unit: unit.into(),
        })
        .await
    }

    pub async fn daemon_reload(&self) -> bool {
        self.send(EngineRequest::DaemonReload).await
    }

    pub async fn edit(&self, unit: impl Into<String>) -> bool {
        self.send(EngineRequest::Edit { unit: unit.into() }).await
    }

    pub async fn show_status(&self, unit: impl Into<String>) -> bool {
        self.send(EngineRequest::ShowStatus { unit: unit.into() })
            .await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(EngineRequest::Shutdown).await
    }
}
