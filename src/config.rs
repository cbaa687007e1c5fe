// src/config.rs

//! Manages server configuration: loading, defaults and validation.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// A freshly accepted connection must complete its handshake within this
    /// window or it is denied.
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,
    /// Rolling deadline on every send and receive; a connection silent
    /// longer than this is torn down.
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    /// Budget for graceful shutdown draining.
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            handshake_timeout: default_handshake_timeout(),
            idle_timeout: default_idle_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            tls: TlsConfig::default(),
            presence: PresenceConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file '{path}'"))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing config file '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tls.enabled && (self.tls.cert_path.is_empty() || self.tls.key_path.is_empty()) {
            bail!("tls.enabled requires both tls.cert_path and tls.key_path");
        }
        if self.idle_timeout.is_zero() {
            bail!("idle_timeout must be non-zero");
        }
        if self.handshake_timeout.is_zero() {
            bail!("handshake_timeout must be non-zero");
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4870
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_cert_path() -> String {
    "fleetkeeper.crt".to_string()
}
fn default_key_path() -> String {
    "fleetkeeper.key".to_string()
}

/// Tuning for the heartbeat-driven presence store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PresenceConfig {
    /// How often the background sweep looks for stale records.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    /// Maximum silence before a presumed-online device is marked offline.
    #[serde(with = "humantime_serde", default = "default_staleness")]
    pub staleness: Duration,
    /// The sweep scans the whole fleet under one write lock; holding it
    /// longer than this raises a warning.
    #[serde(with = "humantime_serde", default = "default_lock_warn_budget")]
    pub lock_warn_budget: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            staleness: default_staleness(),
            lock_warn_budget: default_lock_warn_budget(),
        }
    }
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_staleness() -> Duration {
    Duration::from_secs(60)
}
fn default_lock_warn_budget() -> Duration {
    Duration::from_secs(3)
}
