// src/core/presence/mod.rs

//! Presence tracking for devices that report liveness via periodic
//! out-of-band heartbeats rather than a held connection.
//!
//! The store is independent of the TCP layer: the HTTP layer (an external
//! collaborator) delivers heartbeats through [`PresenceStore::ping`], and the
//! background sweeper flips silent records offline.

pub mod sweeper;

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PresenceConfig;
use crate::core::events::{EventArg, NotificationBus, TOPIC_DEVICE_OFFLINE, TOPIC_DEVICE_ONLINE};

/// A liveness signal as delivered by the ingestion layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub build_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ip: String,
}

/// Last-known heartbeat state for one device.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    #[serde(flatten)]
    pub heartbeat: HeartbeatMessage,

    pub is_online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinged_at: DateTime<Utc>,
}

enum PingOutcome {
    Registered(PresenceRecord),
    CameOnline(PresenceRecord),
    Refreshed,
    KindMismatch { stored: String, reported: String },
}

/// Per-device presence records behind one reader/writer lock. All critical
/// sections are map scans with no I/O; state-change notifications are
/// published only after the lock is released.
pub struct PresenceStore {
    records: RwLock<HashMap<String, PresenceRecord>>,
    bus: Arc<NotificationBus>,
    staleness: TimeDelta,
    lock_warn_budget: std::time::Duration,
}

impl PresenceStore {
    pub fn new(bus: Arc<NotificationBus>, config: &PresenceConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            bus,
            staleness: TimeDelta::from_std(config.staleness).unwrap_or(TimeDelta::MAX),
            lock_warn_budget: config.lock_warn_budget,
        }
    }

    /// Records are keyed by the reported identifier; heartbeats from clients
    /// that predate identifier support fall back to `name@ip`.
    pub fn record_key(msg: &HeartbeatMessage) -> String {
        if msg.id.is_empty() {
            format!("{}@{}", msg.name, msg.ip)
        } else {
            msg.id.clone()
        }
    }

    /// Ingests one heartbeat and updates the device's presence state.
    ///
    /// The reported kind is treated as immutable identity: a mismatch
    /// indicates a misconfigured or colliding identifier and the heartbeat is
    /// dropped without mutation. Metadata refreshes and the online transition
    /// are independent of each other.
    pub fn ping(&self, msg: HeartbeatMessage) {
        let key = Self::record_key(&msg);
        let now = Utc::now();

        let outcome = {
            let mut records = self.records.write();
            match records.get_mut(&key) {
                None => {
                    let record = PresenceRecord {
                        heartbeat: msg,
                        is_online: true,
                        created_at: now,
                        updated_at: now,
                        pinged_at: now,
                    };
                    records.insert(key.clone(), record.clone());
                    PingOutcome::Registered(record)
                }
                Some(record) if record.heartbeat.kind != msg.kind => PingOutcome::KindMismatch {
                    stored: record.heartbeat.kind.clone(),
                    reported: msg.kind,
                },
                Some(record) => {
                    record.pinged_at = now;

                    if !msg.revision.is_empty() && record.heartbeat.revision != msg.revision {
                        record.heartbeat.revision = msg.revision;
                        record.updated_at = now;
                    }
                    if !msg.branch.is_empty() && record.heartbeat.branch != msg.branch {
                        record.heartbeat.branch = msg.branch;
                        record.updated_at = now;
                    }
                    if msg.build_time.is_some() && record.heartbeat.build_time != msg.build_time {
                        record.heartbeat.build_time = msg.build_time;
                        record.updated_at = now;
                    }

                    if !record.is_online {
                        record.is_online = true;
                        PingOutcome::CameOnline(record.clone())
                    } else {
                        PingOutcome::Refreshed
                    }
                }
            }
        };

        match outcome {
            PingOutcome::Registered(record) => {
                debug!(device = %key, "registered");
                self.bus
                    .publish(TOPIC_DEVICE_ONLINE, &[EventArg::Presence(record)]);
            }
            PingOutcome::CameOnline(record) => {
                debug!(device = %key, "came back online");
                self.bus
                    .publish(TOPIC_DEVICE_ONLINE, &[EventArg::Presence(record)]);
            }
            PingOutcome::Refreshed => {}
            PingOutcome::KindMismatch { stored, reported } => {
                warn!(
                    device = %key,
                    stored = %stored,
                    reported = %reported,
                    "heartbeat kind differs from stored record, skipping"
                );
            }
        }
    }

    /// Flips every online record whose last heartbeat is older than the
    /// staleness threshold to offline and notifies subscribers. Returns the
    /// number of transitions.
    ///
    /// The write lock is held for the whole scan; a large fleet under one
    /// lock is this store's principal scaling risk, so the lock-held duration
    /// is measured against a budget.
    pub fn sweep(&self) -> usize {
        let mut went_offline = Vec::new();

        let held = {
            let mut records = self.records.write();
            let start = Instant::now();
            let now = Utc::now();
            for (key, record) in records.iter_mut() {
                if record.is_online && now.signed_duration_since(record.pinged_at) > self.staleness
                {
                    record.is_online = false;
                    debug!(device = %key, "went offline");
                    went_offline.push(record.clone());
                }
            }
            start.elapsed()
        };

        if held > self.lock_warn_budget {
            warn!(
                held_ms = held.as_millis() as u64,
                budget_ms = self.lock_warn_budget.as_millis() as u64,
                "presence sweep held the write lock past budget"
            );
        }

        for record in &went_offline {
            self.bus
                .publish(TOPIC_DEVICE_OFFLINE, &[EventArg::Presence(record.clone())]);
        }

        went_offline.len()
    }

    pub fn get_device(&self, key: &str) -> Option<PresenceRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn get_devices(&self) -> Vec<PresenceRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Inserts or replaces a record wholesale, bypassing heartbeat rules.
    pub fn upsert(&self, record: PresenceRecord) {
        let key = Self::record_key(&record.heartbeat);
        self.records.write().insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
