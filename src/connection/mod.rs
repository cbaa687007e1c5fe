// src/connection/mod.rs

//! Manages a single device connection: framing, locks and deadlines in
//! [`link`], version negotiation and device resolution in [`handshake`].

mod handshake;
mod link;

pub use handshake::{SUPPORTED_MAJOR, handshake};
pub use link::DeviceLink;
