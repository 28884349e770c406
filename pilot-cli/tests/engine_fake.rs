use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use pilot_cli::engines::FakeManager;
use pilot_core::command::{Privilege, UnitAction};
use pilot_core::config::PilotConfig;
use pilot_core::engine::{Engine, EngineHandle};
use pilot_core::error::{ControlCause, LauncherError};
use pilot_core::filter::Scope;
use pilot_core::focus::FocusState;
use pilot_core::launcher::NoLauncher;
use pilot_core::reducer::{EngineEvent, EventEnvelope, PollCause, ViewState, reduce};
use pilot_core::unit::SharedSnapshot;

fn machine() -> Arc<FakeManager> {
    Arc::new(
        FakeManager::new()
            .with_unit("nginx", "active", "running", "A high performance web server")
            .with_unit("ssh", "active", "running", "OpenBSD Secure Shell server")
            .with_unit("cups", "inactive", "dead", "CUPS Scheduler")
            .with_unit("redis", "failed", "failed", "Advanced key-value store"),
    )
}

fn start(
    fake: Arc<FakeManager>,
    privilege: Privilege,
    focus: FocusState,
) -> (EngineHandle, broadcast::Receiver<EventEnvelope>) {
    let engine = Engine::from_config(
        fake,
        Arc::new(NoLauncher),
        &PilotConfig::default(),
        privilege,
        focus,
    );
    let (event_tx, event_rx) = broadcast::channel(512);
    let (handle, _join) = engine.spawn(event_tx);
    (handle, event_rx)
}

async fn next_snapshot(rx: &mut broadcast::Receiver<EventEnvelope>) -> (SharedSnapshot, FocusState, PollCause) {
    loop {
        if let EngineEvent::SnapshotReplaced {
            snapshot,
            focus,
            cause,
        } = rx.recv().await.unwrap().event
        {
            return (snapshot, focus, cause);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_running_scope_lists_nginx_not_failed() {
    let (handle, mut rx) = start(machine(), Privilege::Unprivileged, FocusState::new(Scope::Running));
    let (snapshot, focus, _) = next_snapshot(&mut rx).await;
    let visible: Vec<_> = focus.visible(&snapshot).iter().map(|u| u.short_name.clone()).collect();
    assert_eq!(visible, vec!["nginx", "ssh"]);

    handle.set_scope(Scope::Failed).await;
    let (snapshot, focus, cause) = next_snapshot(&mut rx).await;
    assert_eq!(cause, PollCause::ScopeChanged);
    let visible: Vec<_> = focus.visible(&snapshot).iter().map(|u| u.short_name.clone()).collect();
    assert_eq!(visible, vec!["redis"]);
}

#[tokio::test(start_paused = true)]
async fn test_unprivileged_stop_is_elevated_and_reconciled() {
    let fake = machine();
    let (handle, mut rx) = start(fake.clone(), Privilege::Unprivileged, FocusState::default());
    next_snapshot(&mut rx).await;

    handle.toggle_expanded("nginx").await;
    handle.control(UnitAction::Stop, "nginx").await;

    let (snapshot, focus, cause) = next_snapshot(&mut rx).await;
    assert_eq!(cause, PollCause::Reconcile { unit: "nginx".into() });
    assert_eq!(snapshot.get("nginx").unwrap().status_text(), "inactive (dead)");
    assert_eq!(focus.expanded.as_deref(), Some("nginx"));

    let stop = fake
        .calls()
        .into_iter()
        .find(|argv| argv.iter().any(|a| a == "stop"))
        .unwrap();
    assert_eq!(stop, vec!["pkexec", "systemctl", "stop", "nginx.service"]);
}

#[tokio::test(start_paused = true)]
async fn test_root_runs_without_wrapper() {
    let fake = machine();
    let (handle, mut rx) = start(fake.clone(), Privilege::Root, FocusState::default());
    next_snapshot(&mut rx).await;

    handle.control(UnitAction::Enable, "cups").await;
    next_snapshot(&mut rx).await;
    assert_eq!(fake.is_enabled("cups"), Some(true));
    assert!(fake.calls().iter().all(|argv| argv[0] == "systemctl"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_unit_leaves_snapshot() {
    let fake = machine();
    let (handle, mut rx) = start(fake.clone(), Privilege::Unprivileged, FocusState::default());
    let (before, _, _) = next_snapshot(&mut rx).await;

    handle.control(UnitAction::Stop, "ghost").await;
    let error = loop {
        if let EngineEvent::CommandFailed { error } = rx.recv().await.unwrap().event {
            break error;
        }
    };
    assert_eq!(error.unit.as_deref(), Some("ghost"));
    assert!(matches!(error.cause, ControlCause::Exited { code: Some(5), .. }));
    assert!(error.to_string().starts_with("failed to stop ghost"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let listings = fake
        .calls()
        .iter()
        .filter(|argv| argv.iter().any(|a| a == "list-units"))
        .count();
    assert_eq!(listings, 1);
    assert_eq!(before.generation, 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_units_within_settle_window_both_reconcile() {
    let (handle, mut rx) = start(machine(), Privilege::Root, FocusState::default());
    next_snapshot(&mut rx).await;

    handle.control(UnitAction::Stop, "nginx").await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.control(UnitAction::Start, "cups").await;

    let mut reconciled = Vec::new();
    let mut last = None;
    while reconciled.len() < 2 {
        let (snapshot, _, cause) = next_snapshot(&mut rx).await;
        if let PollCause::Reconcile { unit } = cause {
            reconciled.push(unit);
        }
        last = Some(snapshot);
    }
    assert_eq!(reconciled, vec!["nginx", "cups"]);

    let last = last.unwrap();
    assert_eq!(last.get("nginx").unwrap().status_text(), "inactive (dead)");
    assert_eq!(last.get("cups").unwrap().status_text(), "active (running)");
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_surfaces_error_and_state() {
    let fake = Arc::new(
        FakeManager::new()
            .with_unit("db", "inactive", "dead", "Database")
            .with_broken("db"),
    );
    let (handle, mut rx) = start(fake.clone(), Privilege::Root, FocusState::default());
    next_snapshot(&mut rx).await;

    handle.control(UnitAction::Start, "db").await;
    let error = loop {
        if let EngineEvent::CommandFailed { error } = rx.recv().await.unwrap().event {
            break error;
        }
    };
    assert!(matches!(error.cause, ControlCause::Exited { code: Some(1), .. }));

    // No reconciliation; the operator refreshes to see the failure
    handle.refresh().await;
    let (snapshot, _, cause) = next_snapshot(&mut rx).await;
    assert_eq!(cause, PollCause::Refresh);
    assert!(snapshot.get("db").unwrap().is_failed());
}

#[tokio::test(start_paused = true)]
async fn test_launch_without_terminal_reports() {
    let (handle, mut rx) = start(machine(), Privilege::Unprivileged, FocusState::default());
    next_snapshot(&mut rx).await;

    handle.show_status("nginx").await;
    let error = loop {
        if let EngineEvent::LaunchFailed { error, .. } = rx.recv().await.unwrap().event {
            break error;
        }
    };
    assert!(matches!(error, LauncherError::NoTerminal { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_view_state_follows_engine() {
    let fake = Arc::new(FakeManager::demo().with_latency(Duration::from_millis(50)));
    let (handle, mut rx) = start(fake, Privilege::Root, FocusState::default());
    let mut view = ViewState::new(FocusState::default());

    handle.set_query("redis").await;
    handle.control(UnitAction::Restart, "redis-server").await;

    // Fold until both the first listing and the failed restart are in
    let (mut listed, mut failed) = (false, false);
    while !(listed && failed) {
        let env = rx.recv().await.unwrap();
        reduce(&mut view, &env);
        match env.event {
            EngineEvent::SnapshotReplaced { .. } => listed = true,
            EngineEvent::CommandFailed { .. } => failed = true,
            _ => {}
        }
    }

    assert_eq!(view.focus.query, "redis");
    assert!(view.busy.is_empty());
    assert!(
        view.notices
            .iter()
            .any(|n| n.text.contains("restart redis-server"))
    );
    let visible: Vec<_> = view.visible().iter().map(|u| u.short_name.clone()).collect();
    assert_eq!(visible, vec!["redis-server"]);
}
