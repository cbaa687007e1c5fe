// src/connection/link.rs

//! Owns one device socket: framing, read/write mutual exclusion and the
//! rolling idle deadline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::trace;

use crate::core::FleetError;
use crate::core::device::Device;
use crate::core::protocol::{
    Denied, Frame, FrameHeader, HEADER_LEN, MAX_BODY_LEN, MessageType, decode_header,
    encode_header,
};

/// A live wrapper around one socket plus the device it authenticated as.
///
/// The device is embedded as a value copy after a successful handshake; the
/// connection manager exclusively owns each link for its lifetime. The stream
/// type is generic so tests can run links over in-memory duplex pipes.
pub struct DeviceLink<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    peer: SocketAddr,
    idle_window: Duration,
    request_ids: AtomicU64,
    device: Device,
}

impl<S> DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, idle_window: Duration) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer,
            idle_window,
            request_ids: AtomicU64::new(0),
            device: Device::default(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The device this link authenticated as. Unregistered (all defaults)
    /// until the handshake binds one.
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn bind(&mut self, device: Device) {
        self.device = device;
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Serializes and writes one frame under the exclusive send lock, so
    /// frames from concurrent callers never interleave. Returns the assigned
    /// request ID. Any failure here is connection-fatal for the caller.
    pub async fn send<M: Message>(
        &self,
        msg_type: MessageType,
        msg: &M,
    ) -> Result<u64, FleetError> {
        let body = msg.encode_to_vec();
        let request_id = self.next_request_id();
        let header = encode_header(FrameHeader {
            request_id,
            message_type: msg_type as u64,
            body_len: body.len() as u64,
        });

        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(&header).await?;
            writer.write_all(&body).await?;
            writer.flush().await
        };
        match timeout(self.idle_window, write).await {
            Ok(Ok(())) => {
                trace!(request_id, %msg_type, body_len = body.len(), "frame sent");
                Ok(request_id)
            }
            Ok(Err(e)) => Err(FleetError::Io(e)),
            Err(_) => Err(FleetError::DeadlineExceeded("send")),
        }
    }

    /// Reads exactly one frame under the exclusive read lock: 24 header
    /// bytes, then exactly the declared body length. Short reads are retried
    /// internally until the count is satisfied or the socket errors; a body
    /// shorter than declared is corruption, not retryable.
    ///
    /// Each bounded read restarts the idle window, so any successful
    /// exchange extends the connection's life. A connection silent past the
    /// window fails here and is torn down by its read loop.
    pub async fn receive(&self) -> Result<Frame, FleetError> {
        let mut reader = self.reader.lock().await;

        let mut head = [0u8; HEADER_LEN];
        match timeout(self.idle_window, reader.read_exact(&mut head)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(FleetError::CorruptFrame(format!("reading frame header: {e}")));
            }
            Err(_) => return Err(FleetError::DeadlineExceeded("idle window")),
        }

        let header = decode_header(&head);
        if header.body_len > MAX_BODY_LEN {
            return Err(FleetError::CorruptFrame(format!(
                "declared body length {} exceeds the {} byte limit",
                header.body_len, MAX_BODY_LEN
            )));
        }

        let mut body = vec![0u8; header.body_len as usize];
        if header.body_len > 0 {
            match timeout(self.idle_window, reader.read_exact(&mut body)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(FleetError::CorruptFrame(format!(
                        "frame body shorter than declared length {}: {e}",
                        header.body_len
                    )));
                }
                Err(_) => return Err(FleetError::DeadlineExceeded("idle window")),
            }
        }

        trace!(
            request_id = header.request_id,
            msg_type = header.message_type,
            body_len = header.body_len,
            "frame received"
        );
        Ok(Frame {
            header,
            body: Bytes::from(body),
        })
    }

    /// Shuts the write half down. Single-owner discipline: concurrent closes
    /// are coordinated by the connection manager, not here.
    pub async fn close(&self) -> std::io::Result<()> {
        self.writer.lock().await.shutdown().await
    }

    /// Sends a typed rejection carrying the reason and the soft/hard flag,
    /// then closes. `soft` means the client may retry later.
    pub async fn deny(&self, reason: &str, soft: bool) -> Result<(), FleetError> {
        let msg = Denied {
            reason: reason.to_string(),
            soft,
        };
        self.send(MessageType::Denied, &msg).await?;
        self.close().await?;
        Ok(())
    }
}
