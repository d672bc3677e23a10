//! led-sync-daemon: Background daemon that blinks a notification LED
//!
//! For every posted notification whose app has a configured LED code, the
//! daemon drives a double blink on the LED driver:
//! - Mapping lookup from the user's settings store, re-read per event
//! - Enable + brightness + color writes through a privileged shell
//! - A second pulse a fixed gap after the first
//! - IPC server through which the event source delivers notifications

mod config;
mod events;
mod exec;
mod hardware;
mod ipc;
mod lifecycle;
mod listener;
mod mapping;
#[cfg(test)]
mod testing;
mod trigger;

use std::sync::Arc;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::TriggerEvent;
use crate::exec::{SuExecutor, WorkerPool};
use crate::hardware::HardwareChannel;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::listener::ListenerAccess;
use crate::mapping::{JsonFileSource, MappingStore};
use crate::trigger::TriggerEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "led-sync-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        ?config.prefs_path,
        pulse_gap_ms = config.pulse_gap.as_millis() as u64,
        workers = config.workers,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    // Trigger engine -> status tracking
    let (event_tx, _) = broadcast::channel::<TriggerEvent>(64);

    let executor = Arc::new(SuExecutor::new(&config.su_program));
    let channel = Arc::new(HardwareChannel::new(executor, config.led.clone()));
    let mappings = MappingStore::new(
        Arc::new(JsonFileSource::new(&config.prefs_path)),
        config.mapping_key.clone(),
    );
    let pool = WorkerPool::new(Handle::current(), config.workers);

    let engine = Arc::new(TriggerEngine::new(
        mappings,
        channel,
        pool,
        config.pulse_gap,
        event_tx,
    ));

    let access = Arc::new(ListenerAccess::new(
        Arc::new(JsonFileSource::new(&config.secure_settings_path)),
        config.package.clone(),
        config.settings_command.clone(),
    ));
    if !access.is_enabled() {
        warn!(package = %config.package, "notification access is not enabled");
    }

    let server = Server::new(&config.socket_path, Arc::clone(&engine), access)?;
    let mut trigger_rx = engine.subscribe();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts event-source connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Fold trigger events into the reported status
        _ = async {
            loop {
                match trigger_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "trigger event");
                        server.record(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "trigger event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("trigger event handler exited");
        }

        // Wait for shutdown signal
        signal = shutdown.wait() => {
            info!(signal, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    engine.cancel_all();
    engine.pool().close();
    let status = server.status().await;
    server.shutdown().await;

    info!(
        sessions = status.sessions_started,
        pulses_fired = status.pulses_fired,
        pulses_failed = status.pulses_failed,
        "led-sync-daemon stopped"
    );

    Ok(())
}
