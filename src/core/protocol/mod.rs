// src/core/protocol/mod.rs

//! The wire codec: frame header layout and typed message bodies.

pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameHeader, HEADER_LEN, MAX_BODY_LEN, decode_header, encode_header};
pub use messages::{ApiVersion, ClientInfo, Denied, MessageType, Pong};
