// src/core/registry.rs

//! The device registry interface the hub persists identities through, plus
//! the in-process implementation used by the binary and by tests.
//!
//! The registry is an external collaborator: the core only guarantees it
//! issues at most one handshake-driven insert/update per connection
//! lifecycle, and it assumes the registry serializes conflicting writes to
//! the same record itself.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::core::device::{Device, DeviceId, DeviceState};
use crate::core::errors::FleetError;

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get(&self, id: DeviceId) -> Result<Device, FleetError>;

    /// Fails with a not-found error when the UUID has never been registered.
    async fn get_by_uuid(&self, uuid: &Uuid) -> Result<Device, FleetError>;

    /// Persists a new device and assigns its numeric ID.
    async fn insert(&self, device: Device) -> Result<DeviceId, FleetError>;

    async fn update(&self, device: Device) -> Result<(), FleetError>;

    /// Records a state transition for one device. Administrative states
    /// (banned, deleted) are never overwritten by liveness transitions.
    async fn mark(&self, id: DeviceId, state: DeviceState) -> Result<(), FleetError>;

    /// Bulk state transition across the fleet, same rules as `mark`.
    async fn mark_all(&self, state: DeviceState) -> Result<(), FleetError>;
}

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<DeviceId, Device>,
    by_uuid: HashMap<Uuid, DeviceId>,
    next_id: u64,
}

/// A map-backed registry. All critical sections are plain map operations
/// with no I/O, so the lock is a synchronous `RwLock`.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<RegistryInner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().devices.is_empty()
    }
}

fn apply_mark(device: &mut Device, state: DeviceState) {
    if device.state.is_administrative() {
        return;
    }
    let now = Utc::now();
    device.state = state;
    device.state_fixed_at = now;
    device.updated_at = now;
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn get(&self, id: DeviceId) -> Result<Device, FleetError> {
        self.inner
            .read()
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("device {id}")))
    }

    async fn get_by_uuid(&self, uuid: &Uuid) -> Result<Device, FleetError> {
        let inner = self.inner.read();
        inner
            .by_uuid
            .get(uuid)
            .and_then(|id| inner.devices.get(id))
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("device {uuid}")))
    }

    async fn insert(&self, mut device: Device) -> Result<DeviceId, FleetError> {
        if device.id.is_some() {
            return Err(FleetError::Registry(
                "device already carries a numeric id".into(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.by_uuid.contains_key(&device.uuid) {
            return Err(FleetError::Registry(format!(
                "uuid {} is already registered",
                device.uuid
            )));
        }

        inner.next_id += 1;
        let id = DeviceId(inner.next_id);
        device.id = Some(id);
        inner.by_uuid.insert(device.uuid, id);
        inner.devices.insert(id, device);
        Ok(id)
    }

    async fn update(&self, device: Device) -> Result<(), FleetError> {
        let id = device
            .id
            .ok_or_else(|| FleetError::Registry("cannot update an unregistered device".into()))?;

        let mut inner = self.inner.write();
        if !inner.devices.contains_key(&id) {
            return Err(FleetError::NotFound(format!("device {id}")));
        }
        inner.by_uuid.insert(device.uuid, id);
        inner.devices.insert(id, device);
        Ok(())
    }

    async fn mark(&self, id: DeviceId, state: DeviceState) -> Result<(), FleetError> {
        let mut inner = self.inner.write();
        let device = inner
            .devices
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("device {id}")))?;
        apply_mark(device, state);
        Ok(())
    }

    async fn mark_all(&self, state: DeviceState) -> Result<(), FleetError> {
        let mut inner = self.inner.write();
        for device in inner.devices.values_mut() {
            apply_mark(device, state);
        }
        Ok(())
    }
}
