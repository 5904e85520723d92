//! wspool - Shared WebSocket connection pooling with ack-correlated messaging.
//!
//! This library lets many independent consumers share a small number of
//! physical WebSocket connections. Event subscriptions multiplex safely
//! across consumer lifetimes, and a promise-style request/response primitive
//! ("emit and await a correlated acknowledgment with timeout") runs on top of
//! the fire-and-forget event transport.
//!
//! Key design points:
//!
//! - **Refcounted sharing**: the pool hands out one [`SocketHandle`] per
//!   normalized target key; the connection closes exactly when the last
//!   holder releases it
//! - **Root exemption**: one application-wide handle lives outside the
//!   refcount rules and is closed only by explicit teardown
//! - **Ack correlation**: every `emit_ack` pairs with its response by unique
//!   id, never by arrival order, and settles exactly once
//! - **Scoped cleanup**: [`SocketScope`] removes its own listeners and
//!   releases its reference on every exit path of the owning scope
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use wspool::{ConnectOptions, ConnectionPool, Result, RootSocket, ScopeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = ConnectionPool::new();
//!     pool.base_address().set("ws://127.0.0.1:9001")?;
//!
//!     // The shell owns the root connection.
//!     let root = RootSocket::new();
//!     root.initialize("ws://127.0.0.1:9001", ConnectOptions::default())?;
//!
//!     // A consumer scope: listeners registered now, cleaned up on drop.
//!     let scope = ScopeBuilder::pooled("")
//!         .on("chat.message", |payload| println!("{payload}"))
//!         .bind(&pool, &root)
//!         .await?;
//!
//!     let reply = scope
//!         .handle()
//!         .emit_ack("chat.send", json!({"text": "hello"}))
//!         .await?;
//!     println!("acked: {reply}");
//!
//!     drop(scope);
//!     root.teardown();
//!     pool.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Connection options and the init-once base address |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handle`] | Shared socket handle with pooled/root release rules |
//! | [`identifiers`] | Type-safe id wrappers |
//! | [`pool`] | Keyed, refcounted connection pool |
//! | [`protocol`] | Wire message types (internal) |
//! | [`root`] | Root connection manager |
//! | [`scope`] | Scoped acquisition/release for consumers |
//! | [`transport`] | WebSocket event loop and bookkeeping (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Connection options and the init-once default target address.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Shared socket handle with pooled/root release semantics.
pub mod handle;

/// Type-safe identifiers for correlation and listener bookkeeping.
///
/// Newtype wrappers prevent mixing incompatible ids at compile time.
pub mod identifiers;

/// Keyed, reference-counted connection pool.
pub mod pool;

/// Wire message types for the event channel.
///
/// Internal module defining event/ack frame structures.
pub mod protocol;

/// Root connection manager.
///
/// The application shell owns exactly one root handle.
pub mod root;

/// Scoped acquisition/release for consumers.
pub mod scope;

/// WebSocket transport layer.
///
/// Internal module handling the event loop, listener registry, and pending
/// ack table.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{BaseAddress, ConnectOptions};

// Error types
pub use error::{Error, Result};

// Handle types
pub use handle::SocketHandle;

// Identifier types
pub use identifiers::{CorrelationId, ListenerId};

// Pool types
pub use pool::{ConnectionPool, PoolKey};

// Root manager
pub use root::RootSocket;

// Scope types
pub use scope::{ScopeBuilder, SocketScope};

// Transport surface
pub use transport::{
    DEFAULT_ACK_TIMEOUT, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_ERROR, EVENT_RECONNECT,
};

// ============================================================================
// Test Support
// ============================================================================
