//! Named-event listeners.

use events_core::Event;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Emitted once the instance finished loading.
pub const EVENT_INITIALIZE: &str = "initialize";
/// Emitted with the names of newly registered plugins.
pub const EVENT_REGISTER: &str = "register";
/// Emitted with the names of removed plugins.
pub const EVENT_DEREGISTER: &str = "deregister";
/// Emitted when the ingest destination gives up on an event.
pub const EVENT_DELIVERY_FAILURE: &str = "delivery_failure";

/// Payload handed to listeners.
#[derive(Debug, Clone)]
pub enum Emission {
    Initialize { write_key: String },
    /// A tracking call finished its pipeline run. Emitted under the
    /// method name (`track`, `identify`, ...).
    Dispatched { event: Event, cancelled: bool },
    Plugins { names: Vec<String> },
    DeliveryFailure { event: Event, reason: String },
}

/// Listener callback.
pub type Listener = Arc<dyn Fn(&Emission) + Send + Sync>;

/// Clonable listener registry.
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Arc<RwLock<HashMap<String, Vec<Listener>>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event_name`.
    pub fn on(&self, event_name: &str, listener: Listener) {
        self.listeners
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove every listener for `event_name`.
    pub fn off(&self, event_name: &str) {
        self.listeners.write().remove(event_name);
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners.read().get(event_name).map_or(0, Vec::len)
    }

    /// Call every listener for `event_name`.
    pub fn emit(&self, event_name: &str, emission: &Emission) {
        // Snapshot so listeners may register further listeners.
        let listeners: Vec<Listener> = match self.listeners.read().get(event_name) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        debug!(event_name, listeners = listeners.len(), "Emitting");
        for listener in listeners {
            listener(emission);
        }
    }
}
