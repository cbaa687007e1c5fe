// tests/common/mod.rs

//! Shared helpers for the integration tests: a call-counting registry
//! wrapper, wire-frame builders and polling utilities.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleetkeeper::core::device::{Device, DeviceId, DeviceState, DeviceType};
use fleetkeeper::core::errors::FleetError;
use fleetkeeper::core::protocol::{
    ApiVersion, ClientInfo, FrameHeader, HEADER_LEN, decode_header, encode_header,
};
use fleetkeeper::core::registry::{DeviceRegistry, MemoryRegistry};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Wraps a `MemoryRegistry` and counts every mutating call, so tests can
/// assert exactly which registry operations a scenario performed.
#[derive(Default)]
pub struct RecordingRegistry {
    inner: MemoryRegistry,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    marks: AtomicUsize,
    mark_alls: AtomicUsize,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Pre-populates a device without touching the counters.
    pub async fn seed(&self, device: Device) -> DeviceId {
        self.inner.insert(device).await.expect("seeding device")
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
    pub fn marks(&self) -> usize {
        self.marks.load(Ordering::SeqCst)
    }
    pub fn mark_alls(&self) -> usize {
        self.mark_alls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceRegistry for RecordingRegistry {
    async fn get(&self, id: DeviceId) -> Result<Device, FleetError> {
        self.inner.get(id).await
    }

    async fn get_by_uuid(&self, uuid: &Uuid) -> Result<Device, FleetError> {
        self.inner.get_by_uuid(uuid).await
    }

    async fn insert(&self, device: Device) -> Result<DeviceId, FleetError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(device).await
    }

    async fn update(&self, device: Device) -> Result<(), FleetError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(device).await
    }

    async fn mark(&self, id: DeviceId, state: DeviceState) -> Result<(), FleetError> {
        self.marks.fetch_add(1, Ordering::SeqCst);
        self.inner.mark(id, state).await
    }

    async fn mark_all(&self, state: DeviceState) -> Result<(), FleetError> {
        self.mark_alls.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_all(state).await
    }
}

pub fn client_info(uuid: &Uuid, major: u64) -> ClientInfo {
    ClientInfo {
        api_version: Some(ApiVersion {
            major,
            minor: 0,
            patch: 0,
        }),
        device_uuid: uuid.to_string(),
        device_type: DeviceType::Phone as u64,
        name: "kitchen-phone".to_string(),
        mac: "aa:bb:cc:dd:ee:ff".to_string(),
        secret: "s3cret".to_string(),
    }
}

/// Builds raw header+body bytes for one frame.
pub fn raw_frame(request_id: u64, message_type: u64, body: &[u8]) -> Vec<u8> {
    let mut out = encode_header(FrameHeader {
        request_id,
        message_type,
        body_len: body.len() as u64,
    })
    .to_vec();
    out.extend_from_slice(body);
    out
}

/// Reads one full frame off a raw stream.
pub async fn read_raw_frame<R: AsyncRead + Unpin>(stream: &mut R) -> (FrameHeader, Vec<u8>) {
    let mut head = [0u8; HEADER_LEN];
    stream.read_exact(&mut head).await.expect("reading header");
    let header = decode_header(&head);
    let mut body = vec![0u8; header.body_len as usize];
    if header.body_len > 0 {
        stream.read_exact(&mut body).await.expect("reading body");
    }
    (header, body)
}

pub fn test_addr() -> SocketAddr {
    "127.0.0.1:4870".parse().expect("test addr")
}

/// Polls a condition until it holds or the test is declared stuck.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
