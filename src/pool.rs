//! Reference-counted connection pool.
//!
//! The pool maps a normalized [`PoolKey`] to one shared [`SocketHandle`].
//! Every `acquire` for a key increments that entry's reference count; every
//! `release` decrements it; the connection closes exactly when the count
//! reaches zero, at which point the entry is removed.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               ConnectionPool                │
//! │  ┌───────────────────────────────────────┐  │
//! │  │ ws://a:9001 (reconnect) → handle, n=3 │  │
//! │  │ ws://b:9001            → handle, n=1  │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Invariants:
//!
//! - an entry exists in the registry iff its reference count is > 0;
//! - two acquires with the same normalized key return the same handle while
//!   any reference is live;
//! - the lookup→insert span in [`ConnectionPool::acquire`] contains no await
//!   point (connection establishment happens on the connection's own task),
//!   so two concurrent acquires for an unseen key cannot race a duplicate
//!   connection into the registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BaseAddress, ConnectOptions};
use crate::error::Result;
use crate::handle::SocketHandle;
use crate::transport::Connection;

// ============================================================================
// PoolKey
// ============================================================================

/// Normalized identity of one pooled connection.
///
/// Derived from the requested target (resolved against the pool's
/// [`BaseAddress`] when empty) and the connection options that shape the
/// socket's behavior. Requests normalizing to the same key share a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    url: Url,
    auto_reconnect: bool,
}

impl PoolKey {
    /// Normalizes a requested target and options into a key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid target,
    /// or for an empty target with no base address configured.
    pub fn normalize(target: &str, options: &ConnectOptions, base: &BaseAddress) -> Result<Self> {
        Ok(Self {
            url: base.resolve(target)?,
            auto_reconnect: options.auto_reconnect,
        })
    }

    /// Returns the resolved target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the normalized auto-reconnect flag.
    #[inline]
    #[must_use]
    pub const fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (auto_reconnect={})", self.url, self.auto_reconnect)
    }
}

// ============================================================================
// PoolEntry
// ============================================================================

/// One shared connection and its reference count.
struct PoolEntry {
    handle: Arc<SocketHandle>,
    refs: usize,
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Keyed registry of shared socket handles.
///
/// Thread-safe; the reference count is the sole arbiter of a pooled
/// connection's lifetime.
pub struct ConnectionPool {
    /// Default target for empty acquire keys.
    base: BaseAddress,
    /// Active entries by normalized key.
    entries: Mutex<FxHashMap<PoolKey, PoolEntry>>,
}

impl ConnectionPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: BaseAddress::new(),
            entries: Mutex::new(FxHashMap::default()),
        })
    }

    /// Returns the pool's base address configuration.
    ///
    /// Settable until the first connection is created.
    #[inline]
    #[must_use]
    pub fn base_address(&self) -> &BaseAddress {
        &self.base
    }

    // ========================================================================
    // Acquire / Release
    // ========================================================================

    /// Acquires a shared handle for `target`.
    ///
    /// An empty target resolves to the pool's base address. A hit increments
    /// the entry's reference count and returns the existing handle; a miss
    /// creates the connection (established asynchronously on its own task)
    /// and inserts the entry with count 1.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the target cannot
    /// be normalized.
    pub fn acquire(
        self: &Arc<Self>,
        target: &str,
        options: ConnectOptions,
    ) -> Result<Arc<SocketHandle>> {
        let key = PoolKey::normalize(target, &options, &self.base)?;

        // Creation must stay synchronous under this lock: an await between
        // the lookup and the insert would let two tasks race a second
        // connection into the map for the same key.
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            debug!(key = %key, refs = entry.refs, "Acquired existing connection");
            return Ok(Arc::clone(&entry.handle));
        }

        let connection = Connection::open(key.url().clone(), options);
        let handle = Arc::new(SocketHandle::pooled(
            connection,
            Arc::downgrade(self),
            key.clone(),
        ));
        entries.insert(
            key.clone(),
            PoolEntry {
                handle: Arc::clone(&handle),
                refs: 1,
            },
        );

        info!(key = %key, "Connection created");
        Ok(handle)
    }

    /// Releases one reference for `key`.
    ///
    /// At zero the connection is closed (pending ack requests reject with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)) and the
    /// entry removed. A release with no matching entry signals a lifecycle
    /// mismatch somewhere upstream; it is logged and ignored so consumer
    /// teardown never fails.
    pub fn release(&self, key: &PoolKey) {
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get_mut(key) else {
            warn!(key = %key, "Release without matching acquire; ignored");
            return;
        };

        entry.refs -= 1;
        if entry.refs > 0 {
            debug!(key = %key, refs = entry.refs, "Released connection reference");
            return;
        }

        if let Some(entry) = entries.remove(key) {
            entry.handle.close();
            debug!(key = %key, "Last reference released, connection closed");
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns the reference count for `key` (0 if absent).
    #[must_use]
    pub fn ref_count(&self, key: &PoolKey) -> usize {
        self.entries.lock().get(key).map_or(0, |e| e.refs)
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes every pooled connection and clears the registry.
    ///
    /// Application-shutdown path; individual consumers keep using
    /// `release` in normal operation.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.drain().collect()
        };

        let count = drained.len();
        for (key, entry) in drained {
            entry.handle.close();
            debug!(key = %key, "Connection closed during pool shutdown");
        }

        if count > 0 {
            info!(count, "Pool shut down");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
