// src/core/mod.rs

//! The central module containing the core logic and data structures of Fleetkeeper.

pub mod device;
pub mod errors;
pub mod events;
pub mod presence;
pub mod protocol;
pub mod registry;

pub use device::{Device, DeviceId, DeviceState, DeviceType};
pub use errors::FleetError;
