//! WebSocket transport layer.
//!
//! One [`Connection`] per physical socket, shared by every consumer that
//! holds a reference to it through the pool or the root manager.
//!
//! ```text
//! ┌──────────────┐   commands    ┌─────────────────────┐
//! │  Connection  │──────────────►│   event-loop task   │
//! │  (handle)    │               │  connect/reconnect  │◄──► WebSocket
//! │ on/off/emit  │◄──────────────│  correlate by id    │
//! └──────────────┘  settlements  └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection handle, event loop, reconnection |
//! | `listeners` | Per-event callback registry |
//! | `pending` | Outstanding ack request table |

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle and event loop.
pub mod connection;

/// Per-event callback registry.
pub mod listeners;

/// Outstanding ack request table.
pub mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DEFAULT_ACK_TIMEOUT};
pub use listeners::{
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_ERROR, EVENT_RECONNECT, EventCallback,
    ListenerRegistry,
};
pub use pending::PendingAcks;
