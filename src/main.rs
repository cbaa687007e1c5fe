// src/main.rs

//! The main entry point for the Fleetkeeper hub.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use fleetkeeper::config::Config;
use fleetkeeper::core::events::{
    EventArg, NotificationBus, TOPIC_DEVICE_OFFLINE, TOPIC_DEVICE_ONLINE,
};
use fleetkeeper::core::presence::PresenceStore;
use fleetkeeper::core::registry::{DeviceRegistry, MemoryRegistry};
use fleetkeeper::server;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();
    if args.contains(&"--version".to_string()) {
        println!("Fleetkeeper version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via a --config flag; otherwise
    // it defaults to "fleetkeeper.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("fleetkeeper.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    // The in-process registry stands in for the external device store; swap
    // in any other DeviceRegistry implementation here.
    let registry: Arc<dyn DeviceRegistry> = Arc::new(MemoryRegistry::new());

    let bus = Arc::new(NotificationBus::new());
    bus.subscribe(
        TOPIC_DEVICE_ONLINE,
        Arc::new(|args| info!("{}", format_state_change("online", args))),
    );
    bus.subscribe(
        TOPIC_DEVICE_OFFLINE,
        Arc::new(|args| info!("{}", format_state_change("offline", args))),
    );

    let presence = Arc::new(PresenceStore::new(bus.clone(), &config.presence));

    if let Err(e) = server::run(config, registry, bus, presence).await {
        error!("Server runtime error: {e}");
        return Err(e);
    }

    Ok(())
}

/// Renders a state-change event for the log-based notifier. A chat notifier
/// would subscribe the same way and do its own formatting.
fn format_state_change(state: &str, args: &[EventArg]) -> String {
    match args.first() {
        Some(EventArg::Device(device)) => {
            let label = if device.name.is_empty() {
                device.uuid.to_string()
            } else {
                device.name.clone()
            };
            format!("device {label} ({}) is {state}", device.kind)
        }
        Some(EventArg::Presence(record)) => {
            format!(
                "device {} is {state}",
                PresenceStore::record_key(&record.heartbeat)
            )
        }
        _ => format!("a device is {state}"),
    }
}
