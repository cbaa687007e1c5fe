// src/core/device.rs

//! The device identity model shared by the connection and presence subsystems.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};
use uuid::Uuid;

/// Numeric identity assigned by the registry on first registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The hardware class a device reports at handshake. The raw wire value is
/// a `u64` tag; unmapped tags fall back to `Unknown`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[repr(u64)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Unknown = 0,
    Phone = 1,
    Media = 2,
    Pc = 3,
    Chip = 4,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceState {
    #[default]
    Unknown = 0,
    Online = 1,
    Offline = 2,
    Banned = 3,
    Deleted = 4,
}

impl DeviceState {
    /// Banned and deleted are administrative states: liveness logic (connect,
    /// disconnect, presence sweeps) must never overwrite them.
    pub fn is_administrative(&self) -> bool {
        matches!(self, DeviceState::Banned | DeviceState::Deleted)
    }
}

/// A fleet member as the registry knows it.
///
/// The numeric `id` is assigned exactly once, at first successful
/// registration; the client-supplied `uuid` is immutable once set and is what
/// a reconnecting device identifies itself by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<DeviceId>,
    pub uuid: Uuid,
    pub kind: DeviceType,
    pub name: String,
    pub token: String,
    pub version: String,
    pub mac: String,
    pub ip: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_fixed_at: DateTime<Utc>,
    pub state: DeviceState,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            id: None,
            uuid: Uuid::nil(),
            kind: DeviceType::Unknown,
            name: String::new(),
            token: String::new(),
            version: String::new(),
            mac: String::new(),
            ip: String::new(),
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
            state_fixed_at: DateTime::UNIX_EPOCH,
            state: DeviceState::Unknown,
        }
    }
}
