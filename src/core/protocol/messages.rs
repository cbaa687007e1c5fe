// src/core/protocol/messages.rs

//! Typed message bodies carried inside frames.
//!
//! Bodies use a compact tagged-field binary encoding (prost) so client and
//! server can evolve message schemas independently while staying
//! wire-compatible for known fields.

use std::fmt;

use strum_macros::{Display, FromRepr};

/// Wire tag carried in the frame header. Values are part of the protocol and
/// must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u64)]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    ClientInfo = 1,
    Denied = 2,
    Pong = 3,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ApiVersion {
    #[prost(uint64, tag = "1")]
    pub major: u64,
    #[prost(uint64, tag = "2")]
    pub minor: u64,
    #[prost(uint64, tag = "3")]
    pub patch: u64,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// First (and only) message a client may open a connection with.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientInfo {
    #[prost(message, optional, tag = "1")]
    pub api_version: Option<ApiVersion>,
    #[prost(string, tag = "2")]
    pub device_uuid: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub device_type: u64,
    #[prost(string, tag = "4")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub mac: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub secret: ::prost::alloc::string::String,
}

/// Server-to-client rejection. `soft` tells a well-behaved client whether it
/// may retry later or should stop reconnecting with this configuration.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Denied {
    #[prost(string, tag = "1")]
    pub reason: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub soft: bool,
}

/// Liveness reply; receiving it at all is what extends the connection's life.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Pong {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}
