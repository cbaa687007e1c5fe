// src/server/mod.rs

//! Server assembly: TLS setup, listener binding, background tasks and the
//! signal-driven shutdown sequence.

mod manager;
mod stream;
mod tls;

pub use manager::{ConnectionManager, FrameHandler};
pub use stream::AnyStream;
pub use tls::setup_tls;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::events::NotificationBus;
use crate::core::presence::PresenceStore;
use crate::core::presence::sweeper::PresenceSweeperTask;
use crate::core::registry::DeviceRegistry;

/// Runs the hub until SIGINT/SIGTERM, then drains gracefully.
pub async fn run(
    config: Config,
    registry: Arc<dyn DeviceRegistry>,
    bus: Arc<NotificationBus>,
    presence: Arc<PresenceStore>,
) -> Result<()> {
    let acceptor = setup_tls(&config)?;
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    info!(
        "Fleetkeeper listening on {}:{}",
        config.host, config.port
    );

    let (task_shutdown_tx, _) = broadcast::channel(1);
    let mut background_tasks = JoinSet::new();

    let sweeper = PresenceSweeperTask::new(presence, config.presence.sweep_interval);
    background_tasks.spawn(sweeper.run(task_shutdown_tx.subscribe()));

    let manager = Arc::new(ConnectionManager::new(
        registry,
        bus,
        config.handshake_timeout,
        config.idle_timeout,
    ));
    background_tasks.spawn(manager.clone().serve(listener, acceptor));

    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }

    let _ = task_shutdown_tx.send(());
    match manager.shutdown(config.shutdown_timeout).await {
        Ok(()) => info!("all connections drained"),
        Err(e) => warn!(error = %e, "shutdown deadline expired, draining abandoned"),
    }

    background_tasks.shutdown().await;
    info!("server shutdown complete.");
    Ok(())
}
