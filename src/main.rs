//! mascot-daemon: background commentary daemon for an on-screen mascot
//!
//! This daemon provides:
//! - Ambient context aggregation (notifications, media playback)
//! - Mode selection and the commentary run loop
//! - IPC server for signal listeners, capture pipelines and the mascot UI
//!
//! Out of scope: rendering, animation and the OS-level listeners themselves,
//! which talk to the daemon over IPC.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mascot_daemon::capability::{AccessibilityBridge, ScreenCaptureBridge};
use mascot_daemon::commentary::Orchestrator;
use mascot_daemon::config::Config;
use mascot_daemon::context::ContextStore;
use mascot_daemon::ipc::{Server, ServerContext};
use mascot_daemon::lifecycle::ShutdownSignal;
use mascot_daemon::llm::LlmClient;
use mascot_daemon::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "mascot-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.settings_path, "configuration loaded");

    let settings = match Settings::load_or_default(&config.settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "failed to load settings, using defaults");
            Settings::default()
        }
    };
    info!(
        enabled = settings.enabled,
        analysis_mode = %settings.analysis_mode,
        cooldown_sec = settings.cooldown_sec,
        "settings loaded"
    );
    let (settings_tx, settings_rx) = watch::channel(settings);

    let shutdown = ShutdownSignal::new();

    let store = Arc::new(ContextStore::new());
    let screen = Arc::new(ScreenCaptureBridge::new());
    let accessibility = Arc::new(AccessibilityBridge::new());
    let generator = Arc::new(LlmClient::from_env());

    let orchestrator = Orchestrator::new(
        store.clone(),
        generator,
        screen.clone(),
        accessibility.clone(),
        settings_rx,
    );
    let mode = orchestrator.mode_watch();

    // Orchestrator -> say sink
    let (say_tx, mut say_rx) = mpsc::channel::<String>(32);
    // Say sink -> IPC subscribers
    let (utterance_tx, _) = broadcast::channel::<String>(64);

    let server = Server::new(
        &config.socket_path,
        ServerContext {
            store,
            settings: Arc::new(settings_tx),
            settings_path: config.settings_path.clone(),
            screen,
            accessibility,
            mode,
            utterances: utterance_tx.clone(),
        },
    )?;

    let mut orchestrator_task =
        tokio::spawn(orchestrator.run(say_tx, shutdown.token().child_token()));
    let mut orchestrator_done = false;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Accept IPC clients
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // The orchestrator only returns after its token is cancelled
        result = &mut orchestrator_task => {
            orchestrator_done = true;
            match result {
                Ok(()) => warn!("commentary orchestrator exited"),
                Err(e) => error!(?e, "orchestrator task failed"),
            }
        }

        // Fan finalized utterances out to subscribers
        _ = async {
            while let Some(text) = say_rx.recv().await {
                info!(%text, "say");
                // No subscribers is fine
                let _ = utterance_tx.send(text);
            }
        } => {
            info!("utterance stream closed");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handling failed"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    shutdown.trigger();
    if !orchestrator_done {
        if let Err(e) = orchestrator_task.await {
            warn!(?e, "orchestrator task failed");
        }
    }
    server.shutdown().await;

    info!("mascot-daemon stopped");

    Ok(())
}
