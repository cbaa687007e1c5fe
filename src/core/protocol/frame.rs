// src/core/protocol/frame.rs

//! The fixed-size frame header and its little-endian wire layout.
//!
//! Every message on a device connection is a 24-byte header — request ID,
//! message-type tag, body length, each `u64` little-endian — followed by
//! exactly `body_len` body bytes. No message-type validation happens at this
//! layer; unknown tags are a connection-manager concern.

use bytes::Bytes;
use prost::Message;

use crate::core::errors::FleetError;
use crate::core::protocol::messages::MessageType;

pub const HEADER_LEN: usize = 24;

/// Upper bound on a declared body length. A header declaring more is treated
/// as corrupt before any body byte is read.
pub const MAX_BODY_LEN: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub request_id: u64,
    pub message_type: u64,
    pub body_len: u64,
}

pub fn encode_header(header: FrameHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..8].copy_from_slice(&header.request_id.to_le_bytes());
    buf[8..16].copy_from_slice(&header.message_type.to_le_bytes());
    buf[16..24].copy_from_slice(&header.body_len.to_le_bytes());
    buf
}

pub fn decode_header(buf: &[u8; HEADER_LEN]) -> FrameHeader {
    FrameHeader {
        request_id: read_u64(buf, 0),
        message_type: read_u64(buf, 8),
        body_len: read_u64(buf, 16),
    }
}

fn read_u64(buf: &[u8; HEADER_LEN], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// One header+body unit exchanged over a connection.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Maps the raw message-type tag to a known variant, or `None` for tags
    /// this server does not understand.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_repr(self.header.message_type)
    }

    pub fn decode_body<M: Message + Default>(&self) -> Result<M, FleetError> {
        M::decode(self.body.as_ref()).map_err(Into::into)
    }
}
