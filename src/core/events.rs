// src/core/events.rs

//! The notification bus decoupling state producers (connection manager,
//! presence store) from consumers such as an external chat notifier.
//!
//! The bus knows nothing about payload semantics beyond an opaque topic and
//! argument list. Handlers run synchronously, in registration order, on the
//! publishing caller's own execution context; a slow handler stalls the
//! publisher, so handlers are expected to be fast or to hand work off to
//! their own tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::device::{Device, DeviceState};
use crate::core::presence::PresenceRecord;

/// Published when a device gains a live connection or a fresh heartbeat.
pub const TOPIC_DEVICE_ONLINE: &str = "device.online";
/// Published when a connection drops or a heartbeat goes stale.
pub const TOPIC_DEVICE_OFFLINE: &str = "device.offline";

/// One element of a published argument list. Producers pick the variant that
/// matches their payload; the bus itself never inspects it.
#[derive(Debug, Clone)]
pub enum EventArg {
    Device(Device),
    Presence(PresenceRecord),
    State(DeviceState),
    Text(String),
}

pub type EventHandler = Arc<dyn Fn(&[EventArg]) + Send + Sync>;

/// Topic string mapped to an ordered handler list; append-only for the
/// process lifetime, no removal API.
#[derive(Default)]
pub struct NotificationBus {
    subs: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a handler to the topic's list. No de-duplication.
    pub fn subscribe(&self, topic: impl Into<String>, handler: EventHandler) {
        self.subs.write().entry(topic.into()).or_default().push(handler);
    }

    /// Invokes every currently-registered handler for the topic, in
    /// registration order. The handler list is snapshotted first so the lock
    /// is never held across a callback.
    pub fn publish(&self, topic: &str, args: &[EventArg]) {
        let handlers: Vec<EventHandler> = match self.subs.read().get(topic) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        for handler in &handlers {
            handler(args);
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subs.read().get(topic).map_or(0, Vec::len)
    }
}
