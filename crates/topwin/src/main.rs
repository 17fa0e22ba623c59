//! Binary entrypoint for the topwin CLI.
//!
//! This is the stand-in for the UI surfaces: it constructs the coordinator
//! once, issues toggle requests against it, and routes blocked requests to
//! the matching OS settings pane. Exit status 2 means "blocked on a
//! permission"; a wrapper can re-invoke after the user returns from
//! settings.

use std::{path::PathBuf, process, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use logging as logshared;
use settings::JsonStore;
use tokio::sync::mpsc;
use topwin_engine::{
    Coordinator, Dispatcher, Notice, ProcessControl, ServiceKind, ServiceSpec, SystemGates,
    ToggleKind, ToggleResult,
};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*};

/// File-backed usage statistics for the usage-access gate.
mod usage;

/// Settings-pane redirection for blocked toggles.
mod redirect;

#[derive(Parser, Debug)]
#[command(name = "topwin", about = "Permission-gated overlay toggles", version)]
/// Command-line interface for the `topwin` binary.
struct Cli {
    /// Subcommand; defaults to `status`.
    #[command(subcommand)]
    command: Option<Command>,

    /// The request originated outside the main UI (e.g. a quick-settings
    /// shortcut): treat the overlay toggle as freshly flipped on. One-shot,
    /// never persisted.
    #[arg(long)]
    from_tile: bool,

    /// Path to the settings file (defaults to ~/.topwin/settings.json)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Command used to launch the overlay renderer collaborator
    #[arg(long, value_name = "CMD", default_value = "topwin-overlay")]
    overlay_cmd: String,

    /// Command used to launch the activity monitor collaborator
    #[arg(long, value_name = "CMD", default_value = "topwin-monitor")]
    monitor_cmd: String,

    /// Logging controls
    #[command(flatten)]
    log: logshared::LogArgs,
}

/// Toggle names accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ToggleArg {
    /// The floating info overlay.
    Overlay,
    /// Suppress restart-failure notifications.
    Suppression,
    /// The foreground-app monitor.
    Monitor,
}

impl From<ToggleArg> for ToggleKind {
    fn from(arg: ToggleArg) -> Self {
        match arg {
            ToggleArg::Overlay => Self::OverlayDisplay,
            ToggleArg::Suppression => Self::NotificationSuppression,
            ToggleArg::Monitor => Self::AccessibilityMonitoring,
        }
    }
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Print permission status and persisted toggle state as JSON.
    Status,
    /// Turn a toggle on.
    On {
        /// Which toggle to enable.
        toggle: ToggleArg,
    },
    /// Turn a toggle off.
    Off {
        /// Which toggle to disable.
        toggle: ToggleArg,
    },
    /// Re-assert collaborators against desired state.
    Reconcile,
    /// Subscribe to state changes and print each fresh snapshot.
    Watch,
}

fn main() {
    let cli = Cli::parse();

    let final_spec = logshared::compute_spec(
        cli.log.trace,
        cli.log.debug,
        cli.log.log_level.as_deref(),
        cli.log.log_filter.as_deref(),
    );
    tracing_subscriber::registry()
        .with(logshared::env_filter_from_spec(&final_spec))
        .with(fmt::layer().without_time())
        .try_init()
        .ok();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(settings::default_settings_path);
    let store = match JsonStore::open(&settings_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("cannot open settings at {}: {e}", settings_path.display());
            process::exit(1);
        }
    };

    let usage_log = settings_path.with_file_name("usage.log");
    let gates = Arc::new(SystemGates::new(Arc::new(usage::FileUsageStats::new(
        usage_log.clone(),
    ))));
    let services = Arc::new(ProcessControl::new(service_specs(
        &cli.overlay_cmd,
        &cli.monitor_cmd,
        &settings_path,
        &usage_log,
    )));

    let (notice_tx, mut notices) = mpsc::channel::<Notice>(16);
    let coordinator = Coordinator::new(store, gates, services)
        .with_dispatcher(Dispatcher::new(notice_tx));

    // One-shot external entry point: treat the overlay as freshly flipped on.
    if cli.from_tile {
        debug!("external entry point, requesting overlay on");
        exit_on_blocked(coordinator.request_toggle(ToggleKind::OverlayDisplay, true));
    }

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => {
            let status = serde_json::json!({
                "permissions": permissions::check_permissions(
                    &usage::FileUsageStats::new(usage_log)
                ),
                "state": coordinator.current_state(),
            });
            match serde_json::to_string_pretty(&status) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("failed to serialize status: {e}");
                    process::exit(1);
                }
            }
        }
        Command::On { toggle } => {
            exit_on_blocked(coordinator.request_toggle(toggle.into(), true));
            drain_notices(&mut notices);
        }
        Command::Off { toggle } => {
            exit_on_blocked(coordinator.request_toggle(toggle.into(), false));
            drain_notices(&mut notices);
        }
        Command::Reconcile => {
            coordinator.reconcile();
            drain_notices(&mut notices);
        }
        Command::Watch => watch(&coordinator, notices),
    }
}

/// Launch specs for the two collaborators. Children inherit our effective
/// log filter through `RUST_LOG` so their logs honor the same levels.
fn service_specs(
    overlay_cmd: &str,
    monitor_cmd: &str,
    settings_path: &std::path::Path,
    usage_log: &std::path::Path,
) -> [ServiceSpec; 2] {
    let env = vec![("RUST_LOG".to_string(), logshared::log_config_for_child())];
    [
        ServiceSpec {
            kind: ServiceKind::OverlayRenderer,
            command: overlay_cmd.to_string(),
            args: vec!["--settings".into(), settings_path.display().to_string()],
            env: env.clone(),
            keep_alive: true,
        },
        ServiceSpec {
            kind: ServiceKind::ActivityMonitor,
            command: monitor_cmd.to_string(),
            args: vec!["--log".into(), usage_log.display().to_string()],
            env,
            keep_alive: false,
        },
    ]
}

/// Handle a toggle result: open the settings pane and exit 2 when blocked,
/// exit 1 on a store failure.
fn exit_on_blocked(res: topwin_engine::Result<ToggleResult>) {
    match res {
        Ok(ToggleResult::Applied) => {}
        Ok(ToggleResult::Blocked(reason)) => {
            eprintln!("blocked: missing {reason} permission");
            redirect::open_settings_pane(reason);
            process::exit(2);
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

/// Print any notices a command produced.
fn drain_notices(notices: &mut mpsc::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("[{:?}] {}: {}", notice.kind, notice.title, notice.text);
    }
}

/// Subscribe to the notifier and print a fresh snapshot on every signal.
/// A subscriber holds no authoritative state; it re-reads on each publish.
fn watch(coordinator: &Coordinator, mut notices: mpsc::Receiver<Notice>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            process::exit(1);
        }
    };
    let mut rx = coordinator.notifier().subscribe();
    coordinator.reconcile();
    runtime.block_on(async move {
        loop {
            tokio::select! {
                changed = rx.recv() => {
                    // A lagged receiver is fine: the fresh snapshot covers
                    // whatever was missed.
                    let _ = changed;
                    match serde_json::to_string(&coordinator.current_state()) {
                        Ok(json) => println!("{json}"),
                        Err(e) => eprintln!("failed to serialize state: {e}"),
                    }
                }
                notice = notices.recv() => {
                    let Some(notice) = notice else { break };
                    eprintln!("[{:?}] {}: {}", notice.kind, notice.title, notice.text);
                }
            }
        }
    });
}
