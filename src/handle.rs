//! Shared socket handle.
//!
//! A [`SocketHandle`] is what consumers hold: listener registration, emits,
//! and ack-style requests pass straight through to the underlying
//! [`Connection`]; `release`/`close` carry the sharing rules.
//!
//! Two flavors exist:
//!
//! - **pooled**: owned by a [`ConnectionPool`] entry; `release()` decrements
//!   that entry's reference count and the pool closes the connection when it
//!   reaches zero;
//! - **root**: the application-wide handle; never refcounted, `release()` is
//!   a deliberate no-op and only `close()` (or the root manager's teardown)
//!   actually closes it.
//!
//! `close()` bypasses refcounting entirely, so calling it on a pooled handle
//! would break every other holder; it is reserved for root and forceful
//! cleanup paths.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::identifiers::ListenerId;
use crate::pool::{ConnectionPool, PoolKey};
use crate::transport::Connection;

// ============================================================================
// HandleKind
// ============================================================================

/// Ownership flavor of a handle.
enum HandleKind {
    /// Refcounted by a pool entry under `key`.
    Pooled {
        pool: Weak<ConnectionPool>,
        key: PoolKey,
    },
    /// Application-wide root handle, exempt from refcounting.
    Root,
}

// ============================================================================
// SocketHandle
// ============================================================================

/// Shared, refcounted (or root) socket wrapper.
///
/// All registration and send operations are passthroughs to the shared
/// [`Connection`]; many consumers use one handle concurrently.
pub struct SocketHandle {
    connection: Connection,
    kind: HandleKind,
}

impl SocketHandle {
    /// Creates a pooled handle owned by `pool` under `key`.
    pub(crate) fn pooled(connection: Connection, pool: Weak<ConnectionPool>, key: PoolKey) -> Self {
        Self {
            connection,
            kind: HandleKind::Pooled { pool, key },
        }
    }

    /// Creates the root handle.
    pub(crate) fn root(connection: Connection) -> Self {
        Self {
            connection,
            kind: HandleKind::Root,
        }
    }

    // ========================================================================
    // Passthrough surface
    // ========================================================================

    /// Registers a callback for `event`. See [`Connection::on`].
    pub fn on(&self, event: &str, callback: impl Fn(Value) + Send + Sync + 'static) -> ListenerId {
        self.connection.on(event, callback)
    }

    /// Registers a one-shot callback for `event`. See [`Connection::once`].
    pub fn once(
        &self,
        event: &str,
        callback: impl Fn(Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.connection.once(event, callback)
    }

    /// Removes one registration. See [`Connection::off`].
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.connection.off(event, id)
    }

    /// Sends a fire-and-forget event. See [`Connection::emit`].
    pub fn emit(&self, event: &str, payload: Value) {
        self.connection.emit(event, payload);
    }

    /// Sends an ack-style request with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::emit_ack`].
    pub async fn emit_ack(&self, event: &str, payload: Value) -> Result<Value> {
        self.connection.emit_ack(event, payload).await
    }

    /// Sends an ack-style request with a caller-chosen timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::emit_ack_with_timeout`].
    pub async fn emit_ack_with_timeout(
        &self,
        event: &str,
        payload: Value,
        ack_timeout: Duration,
    ) -> Result<Value> {
        self.connection
            .emit_ack_with_timeout(event, payload, ack_timeout)
            .await
    }

    /// Returns the number of outstanding ack requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.connection.pending_count()
    }

    /// Returns the number of listeners registered for `event`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.connection.listener_count(event)
    }

    /// Returns `true` while the underlying connection's event loop is alive.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    /// Returns `true` for the root handle.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self.kind, HandleKind::Root)
    }

    /// Returns the pool key for a pooled handle.
    #[must_use]
    pub fn key(&self) -> Option<&PoolKey> {
        match &self.kind {
            HandleKind::Pooled { key, .. } => Some(key),
            HandleKind::Root => None,
        }
    }

    /// Releases one reference.
    ///
    /// Pooled: delegates to [`ConnectionPool::release`]; the connection closes
    /// only when the last reference goes. Root: a no-op; the root's lifetime
    /// belongs to the application shell, and any number of `release` calls
    /// must leave it open.
    pub fn release(&self) {
        match &self.kind {
            HandleKind::Pooled { pool, key } => match pool.upgrade() {
                Some(pool) => pool.release(key),
                None => warn!(key = %key, "Release after pool was dropped"),
            },
            HandleKind::Root => {
                warn!("release() called on the root handle; ignored");
            }
        }
    }

    /// Forcibly closes the underlying connection, bypassing refcounting.
    ///
    /// Rejects all pending ack requests with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) and
    /// deregisters every listener.
    pub fn close(&self) {
        self.connection.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
