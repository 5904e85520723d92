//! Per-connection event listener registry.
//!
//! Many consumers register callbacks for the same connection independently;
//! the registry keeps them apart. Removal is keyed by the
//! [`ListenerId`] returned at registration time and affects only that exact
//! registration. For one event name, listeners fire in registration order.
//!
//! Connection lifecycle notifications (`connect`, `disconnect`, `reconnect`,
//! `error`) travel through the same registry under reserved names, so every
//! consumer can observe them like any other event.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::ListenerId;

// ============================================================================
// Constants
// ============================================================================

/// Fired once the underlying socket is established for the first time.
pub const EVENT_CONNECT: &str = "connect";

/// Fired when the underlying socket drops or is closed.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// Fired when an auto-reconnecting socket is re-established.
pub const EVENT_RECONNECT: &str = "reconnect";

/// Fired with the transport's error message, uninterpreted.
pub const EVENT_ERROR: &str = "error";

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the event payload.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// One registration.
struct ListenerEntry {
    id: ListenerId,
    once: bool,
    callback: EventCallback,
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Registry of `(event name, callback)` registrations for one connection.
#[derive(Default)]
pub struct ListenerRegistry {
    table: Mutex<FxHashMap<String, Vec<ListenerEntry>>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for `event`.
    pub fn add(&self, event: &str, callback: EventCallback) -> ListenerId {
        self.add_entry(event, callback, false)
    }

    /// Registers a callback that is removed after its first invocation.
    pub fn add_once(&self, event: &str, callback: EventCallback) -> ListenerId {
        self.add_entry(event, callback, true)
    }

    fn add_entry(&self, event: &str, callback: EventCallback, once: bool) -> ListenerId {
        let id = ListenerId::next();
        let mut table = self.table.lock();
        table.entry(event.to_owned()).or_default().push(ListenerEntry {
            id,
            once,
            callback,
        });

        trace!(event, listener_id = %id, once, "Listener registered");
        id
    }

    /// Removes the registration named by `(event, id)`.
    ///
    /// Returns `true` if the registration existed. Other listeners for the
    /// same event are untouched.
    pub fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut table = self.table.lock();
        let Some(entries) = table.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() < before;

        if entries.is_empty() {
            table.remove(event);
        }
        if removed {
            trace!(event, listener_id = %id, "Listener removed");
        }
        removed
    }

    /// Dispatches one received event instance to every listener for `event`,
    /// in registration order.
    ///
    /// `once` registrations are dropped from the table before their callback
    /// runs, so a callback that re-entrantly inspects the registry never sees
    /// itself.
    pub fn dispatch(&self, event: &str, payload: &Value) {
        // Snapshot under the lock, invoke outside it; callbacks may register
        // or remove listeners.
        let callbacks: Vec<EventCallback> = {
            let mut table = self.table.lock();
            let Some(entries) = table.get_mut(event) else {
                return;
            };

            let snapshot = entries.iter().map(|e| Arc::clone(&e.callback)).collect();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                table.remove(event);
            }
            snapshot
        };

        trace!(event, listeners = callbacks.len(), "Dispatching event");
        for callback in callbacks {
            callback(payload.clone());
        }
    }

    /// Returns the number of listeners currently registered for `event`.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.table.lock().get(event).map_or(0, Vec::len)
    }

    /// Removes every registration.
    ///
    /// Used by the forced-close path.
    pub fn clear(&self) {
        self.table.lock().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
