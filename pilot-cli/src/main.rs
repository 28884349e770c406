mod commands;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::{RwLock, broadcast};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pilot_core::command::{InteractiveKind, Privilege, UnitAction};
use pilot_core::config::PilotConfig;
use pilot_core::engine::{Engine, EngineHandle, EngineRequest};
use pilot_core::filter::{Filter, Scope};
use pilot_core::focus::FocusState;
use pilot_core::launcher::{InteractiveLauncher, NoLauncher};
use pilot_core::manager;
use pilot_core::reducer::{EngineEvent, EventEnvelope, PollCause, ViewState, reduce};
use pilot_core::runner::ProcessRunner;
use pilot_core::unit::{SharedSnapshot, Snapshot, short_name};

use pilot_cli::engines::{FakeManager, SystemRunner};
use pilot_cli::launcher::TerminalLauncher;

use ui::App;

/// Log filter variable; falls back to `warn`
const LOG_ENV: &str = "SVC_PILOT_LOG";

#[derive(Parser)]
#[command(name = "svc-pilot")]
#[command(about = "Inspect and control systemd service units", long_about = None)]
struct Cli {
    /// Config file (default: $SVC_PILOT_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory fake service manager
    #[arg(long, global = true)]
    demo: bool,

    /// Service manager binary to invoke
    #[arg(long, global = true)]
    manager: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal UI (default)
    Tui,
    /// Print the service list
    List {
        #[arg(long, default_value_t = Scope::All)]
        scope: Scope,
        /// Case-insensitive substring of name or status
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Start {
        unit: String,
    },
    Stop {
        unit: String,
    },
    Restart {
        unit: String,
    },
    Enable {
        unit: String,
    },
    Disable {
        unit: String,
    },
    /// Reload unit files
    DaemonReload,
    /// Edit a unit's overrides in a terminal
    Edit {
        unit: String,
    },
    /// Show a unit's status in a terminal
    Status {
        unit: String,
    },
    /// Check the environment
    Doctor,
}

fn init_tracing(config: &PilotConfig, tui: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    if !tui {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
        return Ok(());
    }

    // Anything written to the terminal would corrupt the UI
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .init();
        }
    }
    Ok(())
}

fn current_privilege() -> Privilege {
    // SAFETY: geteuid has no preconditions and cannot fail
    Privilege::from_euid(unsafe { libc::geteuid() })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config_path, mut config) =
        PilotConfig::discover(cli.config.as_deref()).context("loading configuration")?;
    if let Some(manager) = cli.manager {
        config.manager = manager;
    }
    config.validate()?;

    let tui = matches!(cli.command, None | Some(Commands::Tui));
    init_tracing(&config, tui)?;

    let privilege = current_privilege();
    let runner: Arc<dyn ProcessRunner> = if cli.demo {
        Arc::new(FakeManager::demo())
    } else {
        Arc::new(SystemRunner::new())
    };
    // No real terminal should run the real manager against fake units
    let launcher: Arc<dyn InteractiveLauncher> = if cli.demo {
        Arc::new(NoLauncher)
    } else {
        Arc::new(TerminalLauncher::from_config(&config))
    };

    let engine = |focus: FocusState| {
        Engine::from_config(runner.clone(), launcher.clone(), &config, privilege, focus)
    };

    match cli.command {
        None | Some(Commands::Tui) => run_tui(engine(FocusState::default())).await,
        Some(Commands::List { scope, query, json }) => {
            run_list(runner, &config, privilege, scope, query.unwrap_or_default(), json).await
        }
        Some(Commands::Start { unit }) => run_control(engine, UnitAction::Start, &unit).await,
        Some(Commands::Stop { unit }) => run_control(engine, UnitAction::Stop, &unit).await,
        Some(Commands::Restart { unit }) => run_control(engine, UnitAction::Restart, &unit).await,
        Some(Commands::Enable { unit }) => run_control(engine, UnitAction::Enable, &unit).await,
        Some(Commands::Disable { unit }) => run_control(engine, UnitAction::Disable, &unit).await,
        Some(Commands::DaemonReload) => {
            run_oneshot(engine(FocusState::default()), EngineRequest::DaemonReload).await
        }
        Some(Commands::Edit { unit }) => {
            run_oneshot(engine(FocusState::default()), EngineRequest::Edit { unit }).await
        }
        Some(Commands::Status { unit }) => {
            run_oneshot(engine(FocusState::default()), EngineRequest::ShowStatus { unit }).await
        }
        Some(Commands::Doctor) => {
            commands::run_doctor(config_path.as_deref(), &config, privilege, runner).await
        }
    }
}

// --- One-shot commands ---

async fn run_list(
    runner: Arc<dyn ProcessRunner>,
    config: &PilotConfig,
    privilege: Privilege,
    scope: Scope,
    query: String,
    json: bool,
) -> anyhow::Result<()> {
    let (enumerator, _) = manager::from_config(runner, config, privilege);
    let units = enumerator.poll(scope).await?;
    let snapshot = Snapshot::new(1, scope, units);
    let visible = Filter::new(scope, query).apply(&snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&visible)?);
        return Ok(());
    }

    for unit in &visible {
        println!(
            "{:<32} {:<24} {}",
            unit.short_name,
            unit.status_text(),
            unit.description
        );
    }
    let (running, failed, total) = snapshot.counts();
    eprintln!(
        "\n{} shown · {} running · {} failed · {} listed",
        visible.len(),
        running,
        failed,
        total
    );
    Ok(())
}

fn print_unit(snapshot: &SharedSnapshot, unit: &str) {
    match snapshot.get(unit) {
        Some(u) => println!("{}: {}", u.full_name, u.status_text()),
        // Units that stop may drop out of a scoped listing
        None => println!("{}: not listed", unit),
    }
}

/// Issue one lifecycle command, then wait out the settle delay and report
/// the unit's reconciled state.
async fn run_control<F>(engine: F, action: UnitAction, unit: &str) -> anyhow::Result<()>
where
    F: Fn(FocusState) -> Engine,
{
    let unit = short_name(unit).to_string();
    let (event_tx, mut rx) = broadcast::channel::<EventEnvelope>(256);
    let (handle, join) = engine(FocusState::default()).spawn(event_tx);

    println!("{} {}...", action.progressive(), unit);
    handle.control(action, unit.clone()).await;

    let result = loop {
        let env = match rx.recv().await {
            Ok(env) => env,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break Err(anyhow::anyhow!("engine stopped")),
        };
        match env.event {
            EngineEvent::CommandFailed { error } => break Err(error.into()),
            EngineEvent::ReconciliationScheduled { delay, .. } => {
                println!("ok; checking state in {:.1}s", delay.as_secs_f32());
            }
            EngineEvent::SnapshotReplaced {
                snapshot,
                cause: PollCause::Reconcile { unit: ref done },
                ..
            } if *done == unit => {
                print_unit(&snapshot, &unit);
                break Ok(());
            }
            EngineEvent::EnumerationFailed {
                error,
                cause: PollCause::Reconcile { .. },
            } => break Err(error.into()),
            _ => {}
        }
    };

    handle.shutdown().await;
    let _ = join.await;
    result
}

/// Daemon-reload and interactive launches: no unit to reconcile
async fn run_oneshot(engine: Engine, request: EngineRequest) -> anyhow::Result<()> {
    let (event_tx, mut rx) = broadcast::channel::<EventEnvelope>(256);
    let (handle, join) = engine.spawn(event_tx);
    let reload = matches!(request, EngineRequest::DaemonReload);
    handle.send(request).await;

    let result = loop {
        let env = match rx.recv().await {
            Ok(env) => env,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break Err(anyhow::anyhow!("engine stopped")),
        };
        match env.event {
            EngineEvent::CommandFailed { error } => break Err(error.into()),
            EngineEvent::CommandSucceeded { op, .. } => println!("{}: ok", op),
            EngineEvent::SnapshotReplaced {
                snapshot,
                cause: PollCause::DaemonReload,
                ..
            } if reload => {
                let (running, failed, total) = snapshot.counts();
                println!("{} services, {} running, {} failed", total, running, failed);
                break Ok(());
            }
            EngineEvent::InteractiveLaunched { kind } => {
                match kind {
                    InteractiveKind::Edit { unit } => println!("opened editor for {}", unit),
                    InteractiveKind::Status { unit } => println!("opened status of {}", unit),
                }
                break Ok(());
            }
            EngineEvent::LaunchFailed { error, .. } => break Err(error.into()),
            _ => {}
        }
    };

    handle.shutdown().await;
    let _ = join.await;
    result
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_tui(engine: Engine) -> anyhow::Result<()> {
    let (event_tx, _) = broadcast::channel::<EventEnvelope>(1_000);
    let state = Arc::new(RwLock::new(ViewState::new(FocusState::default())));

    // Reducer task; subscribed before the engine starts so the first
    // snapshot is not missed
    let state_for_reducer = state.clone();
    let mut reducer_rx = event_tx.subscribe();
    let (handle, join) = engine.spawn(event_tx);
    let handle_for_reducer = handle.clone();
    tokio::spawn(async move {
        loop {
            match reducer_rx.recv().await {
                Ok(env) => {
                    let mut s = state_for_reducer.write().await;
                    reduce(&mut s, &env);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // A dropped snapshot would leave the view stale
                    warn!(skipped = n, "view lagged behind engine, refreshing");
                    handle_for_reducer.refresh().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut terminal = setup_terminal()?;
    let res = tui_loop(&mut terminal, state, &handle).await;
    restore_terminal(terminal)?;

    handle.shutdown().await;
    let _ = join.await;
    res
}

/// What the key handler needs from one frame
struct FrameInfo {
    selected: Option<String>,
    visible: usize,
    scope: Scope,
    expanded: bool,
    query: String,
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: Arc<RwLock<ViewState>>,
    engine: &EngineHandle,
) -> anyhow::Result<()> {
    let mut app = App::default();

    loop {
        let info = {
            let view = state.read().await;
            terminal.draw(|f| ui::view::draw(f, &view, &mut app))?;
            let visible = view.visible();
            FrameInfo {
                selected: app.selected_unit(&visible).map(|u| u.short_name.clone()),
                visible: visible.len(),
                scope: view.focus.scope,
                expanded: view.focus.expanded.is_some(),
                query: view.focus.query.clone(),
            }
        };

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        let CEvent::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            break;
        }

        if app.searching {
            match code {
                KeyCode::Esc => {
                    app.searching = false;
                    app.query.clear();
                    engine.set_query("").await;
                }
                KeyCode::Enter => app.searching = false,
                KeyCode::Backspace => {
                    app.query.pop();
                    engine.set_query(app.query.clone()).await;
                }
                KeyCode::Char(c) => {
                    app.query.push(c);
                    engine.set_query(app.query.clone()).await;
                }
                _ => {}
            }
            continue;
        }

        let control = |action: UnitAction| {
            info.selected
                .clone()
                .map(|unit| EngineRequest::Control { action, unit })
        };

        let request = match code {
            KeyCode::Char('q') => break,
            KeyCode::Down | KeyCode::Char('j') => {
                app.move_by(1, info.visible);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.move_by(-1, info.visible);
                None
            }
            KeyCode::PageDown => {
                app.move_by(10, info.visible);
                None
            }
            KeyCode::PageUp => {
                app.move_by(-10, info.visible);
                None
            }
            KeyCode::Enter | KeyCode::Char(' ') => info
                .selected
                .clone()
                .map(|unit| EngineRequest::ToggleExpanded { unit }),
            KeyCode::Tab => Some(EngineRequest::SetScope {
                scope: info.scope.cycle(),
            }),
            KeyCode::Char(c @ '1'..='4') => {
                let i = c as usize - '1' as usize;
                Some(EngineRequest::SetScope {
                    scope: Scope::ALL[i],
                })
            }
            KeyCode::Char('/') => {
                app.searching = true;
                app.query = info.query.clone();
                None
            }
            KeyCode::Esc if info.expanded => Some(EngineRequest::Collapse),
            KeyCode::Esc if !info.query.is_empty() => {
                app.query.clear();
                Some(EngineRequest::SetQuery {
                    query: String::new(),
                })
            }
            KeyCode::Char('s') => control(UnitAction::Start),
            KeyCode::Char('x') => control(UnitAction::Stop),
            KeyCode::Char('r') => control(UnitAction::Restart),
            KeyCode::Char('e') => control(UnitAction::Enable),
            KeyCode::Char('d') => control(UnitAction::Disable),
            KeyCode::Char('E') => info.selected.clone().map(|unit| EngineRequest::Edit { unit }),
            KeyCode::Char('i') => info
                .selected
                .clone()
                .map(|unit| EngineRequest::ShowStatus { unit }),
            KeyCode::Char('R') => Some(EngineRequest::DaemonReload),
            KeyCode::Char('g') => Some(EngineRequest::Refresh),
            _ => None,
        };

        if let Some(request) = request {
            if !engine.send(request).await {
                bail!("engine stopped unexpectedly");
            }
        }
    }

    Ok(())
}
