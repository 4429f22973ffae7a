mod arbiter;
mod config;
mod controller;
mod frame;
mod hardware;
mod ingress;
mod layout;
mod mailbox;
mod mapper;
mod pattern;
mod power;
mod status;
mod web;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use arbiter::{Arbiter, ScheduleState};
use config::AppConfig;
use mailbox::Mailbox;
use pattern::PatternRunner;
use status::Status;

/// Shared application state, reachable from every task and from the control
/// surface. The controller thread holds its own `Arc` clones of `arbiter`,
/// `mailbox`, `pattern_runner`, and `status` directly rather than through
/// this struct — it never touches `AppState` itself.
pub struct AppState {
    pub arbiter: Arc<Arbiter>,
    pub mailbox: Arc<Mailbox>,
    pub status: Arc<Status>,
    pub config_path: PathBuf,
    pub shutdown: CancellationToken,
    pub config_changed: tokio::sync::Notify,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgrid=info".parse().unwrap()),
        )
        .init();

    info!("ledgrid starting");

    let config_path = find_config_path();
    info!("Config file: {}", config_path.display());

    let initial_config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            info!(
                "Config loaded: {}x{} canvas, {} panels, brightness {}",
                cfg.layout.grid_width * cfg.layout.panel_width,
                cfg.layout.grid_height * cfg.layout.panel_height,
                cfg.layout.units.len(),
                cfg.brightness
            );
            cfg
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let arbiter = match build_arbiter(&initial_config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Failed to apply initial config: {}", e);
            std::process::exit(1);
        }
    };

    let mailbox = Arc::new(Mailbox::new());
    let pattern_runner = Arc::new(PatternRunner::new());
    let status = Arc::new(Status::new());

    let state = Arc::new(AppState {
        arbiter: Arc::clone(&arbiter),
        mailbox: Arc::clone(&mailbox),
        status: Arc::clone(&status),
        config_path: config_path.clone(),
        shutdown: CancellationToken::new(),
        config_changed: tokio::sync::Notify::new(),
    });

    // Frame ingress transports — thin adapters that only touch the Mailbox
    // and read the Arbiter's current canvas size, never the hardware.
    let datagram_bind = initial_config.ingress.datagram_bind.clone();
    let datagram_handle = tokio::spawn(ingress::datagram::run(
        datagram_bind,
        Arc::clone(&mailbox),
        Arc::clone(&arbiter),
        state.shutdown.clone(),
    ));

    let pipe_handle = initial_config.ingress.pipe_path.clone().map(|path| {
        tokio::spawn(ingress::pipe::run(
            path,
            Arc::clone(&mailbox),
            Arc::clone(&arbiter),
            state.shutdown.clone(),
        ))
    });

    // Hot-reload file watcher — notify-based, upgraded from a polling loop
    // (see SPEC_FULL.md REDESIGN FLAGS).
    let watcher_state = Arc::clone(&state);
    let watcher_handle = tokio::spawn(config_watcher_task(watcher_state));

    // Control surface.
    let web_state = Arc::clone(&state);
    let web_bind = initial_config.ingress.web_bind.clone();
    let web_handle = tokio::spawn(web::server::run(web_state, web_bind));

    // Display controller — dedicated OS thread, not a tokio task: it must
    // sleep with sub-millisecond jitter and calls blocking hardware FFI,
    // which doesn't fit `spawn_blocking`'s short-lived model.
    #[cfg(feature = "hardware")]
    let hardware_sink: Box<dyn hardware::HardwareSink> = {
        let snap = arbiter.snapshot();
        Box::new(hardware::RpiMatrixSink::new(
            snap.layout.panel_height as u32,
            snap.layout.panel_width as u32,
            snap.layout.units().len() as u32,
        ))
    };
    #[cfg(not(feature = "hardware"))]
    let hardware_sink: Box<dyn hardware::HardwareSink> = {
        let led_count = arbiter.snapshot().layout.led_count();
        Box::new(hardware::MockSink::new(led_count))
    };

    let controller_running = Arc::new(AtomicBool::new(true));
    let controller_arbiter = Arc::clone(&arbiter);
    let controller_mailbox = Arc::clone(&mailbox);
    let controller_pattern_runner = Arc::clone(&pattern_runner);
    let controller_status = Arc::clone(&status);
    let controller_running_flag = Arc::clone(&controller_running);
    let controller_thread = match std::thread::Builder::new().name("controller".into()).spawn(move || {
        controller::run(
            controller_arbiter,
            controller_mailbox,
            controller_pattern_runner,
            controller_status,
            hardware_sink,
            controller_running_flag,
            controller::ControllerConfig::default(),
        )
    }) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to spawn display controller thread: {}", e);
            std::process::exit(1);
        }
    };

    info!("All tasks started");

    shutdown_signal().await;
    info!("Shutdown signal received");

    state.shutdown.cancel();
    controller_running.store(false, Ordering::Relaxed);

    let _ = datagram_handle.await;
    if let Some(handle) = pipe_handle {
        let _ = handle.await;
    }
    let _ = watcher_handle.await;
    let _ = web_handle.await;
    controller_thread.join().ok();

    info!("Shutdown complete");
}

/// Find the config.json file (check CWD, then parent directory).
fn find_config_path() -> PathBuf {
    let candidates = [PathBuf::from("config.json"), PathBuf::from("../config.json")];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }
    PathBuf::from("config.json")
}

/// Build an `Arbiter` from a freshly loaded `AppConfig`, applying every
/// scalar field on top of the parsed layout.
fn build_arbiter(config: &AppConfig) -> Result<Arbiter, arbiter::ArbiterError> {
    let arbiter = Arbiter::new(config.layout.clone())?;
    arbiter.set_brightness(config.brightness)?;
    arbiter.set_pattern(config.pattern.clone())?;
    arbiter.set_schedule(if config.schedule_awake { ScheduleState::Awake } else { ScheduleState::Asleep });
    if config.power.enabled {
        arbiter.set_power_ceiling(config.power.ceiling_amps, config.power.enabled)?;
    }
    Ok(arbiter)
}

/// Watch the config file for changes with `notify` and publish the diff
/// through the Arbiter. `notify`'s channel is synchronous, so the blocking
/// receive loop runs on its own OS thread and bridges into tokio through a
/// bounded channel the async side awaits on.
async fn config_watcher_task(state: Arc<AppState>) {
    use notify::{RecursiveMode, Watcher};

    let (tx, rx) = std_mpsc::channel();
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!("[CONFIG] Failed to create file watcher: {}", e);
            return;
        }
    };

    let watch_path = state.config_path.clone();
    if let Err(e) = watcher.watch(&watch_path, RecursiveMode::NonRecursive) {
        warn!("[CONFIG] Failed to watch {}: {}", watch_path.display(), e);
        return;
    }

    let (async_tx, mut async_rx) = tokio::sync::mpsc::unbounded_channel();
    let bridge_shutdown = state.shutdown.clone();
    std::thread::spawn(move || {
        for event in rx {
            if bridge_shutdown.is_cancelled() {
                break;
            }
            if async_tx.send(event).is_err() {
                break;
            }
        }
    });

    info!("[CONFIG] Watching {} for changes", watch_path.display());

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("[CONFIG] Shutting down");
                break;
            }
            event = async_rx.recv() => {
                let Some(event) = event else { break };
                let Ok(event) = event else { continue };
                if !matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                    continue;
                }
                apply_reload(&state).await;
            }
        }
    }
}

/// Reload the config file and publish every scalar field that changed
/// through the Arbiter. A parse failure leaves the running system untouched:
/// an invalid layout is rejected and the prior snapshot is retained.
async fn apply_reload(state: &AppState) {
    match AppConfig::load(&state.config_path) {
        Ok(new_config) => {
            if let Err(e) = state.arbiter.set_layout(new_config.layout.clone()) {
                warn!("[CONFIG] Reload rejected (layout): {}", e);
                return;
            }
            if let Err(e) = state.arbiter.set_brightness(new_config.brightness) {
                warn!("[CONFIG] Reload rejected (brightness): {}", e);
            }
            if let Err(e) = state.arbiter.set_pattern(new_config.pattern.clone()) {
                warn!("[CONFIG] Reload rejected (pattern): {}", e);
            }
            state.arbiter.set_schedule(if new_config.schedule_awake {
                ScheduleState::Awake
            } else {
                ScheduleState::Asleep
            });
            if new_config.power.enabled {
                if let Err(e) = state
                    .arbiter
                    .set_power_ceiling(new_config.power.ceiling_amps, new_config.power.enabled)
                {
                    warn!("[CONFIG] Reload rejected (power): {}", e);
                }
            }
            state.config_changed.notify_waiters();
            info!("[CONFIG] Reloaded and applied");
        }
        Err(e) => warn!("[CONFIG] Reload failed: {}", e),
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl-C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
