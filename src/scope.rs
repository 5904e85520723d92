//! Scoped acquisition and release.
//!
//! A [`SocketScope`] ties a consumer's socket usage to a Rust scope: build it
//! with the target and the `(event, callback)` pairs the consumer wants, and
//! on drop it removes exactly those listeners and releases its pool
//! reference. Every exit path of the owning scope performs the cleanup, so a
//! consumer can neither leak its registrations nor release twice.
//!
//! Root mode borrows the application-wide handle instead of acquiring from
//! the pool: [`ScopeBuilder::bind`] waits for [`RootSocket::initialize`] to
//! have happened (never creating a duplicate root connection), and drop only
//! removes the scope's own listeners; the root stays open.
//!
//! Retargeting goes through [`SocketScope::rebind`], which tears the old
//! scope down completely before acquiring under the new key, so no stale
//! registration survives a target change.
//!
//! ```ignore
//! let scope = ScopeBuilder::pooled("ws://127.0.0.1:9001")
//!     .on("chat.message", |payload| println!("{payload}"))
//!     .bind(&pool, &root)
//!     .await?;
//!
//! let reply = scope.handle().emit_ack("chat.send", json!({"text": "hi"})).await?;
//! // listeners removed and the pool reference released when `scope` drops
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ConnectOptions;
use crate::error::Result;
use crate::handle::SocketHandle;
use crate::identifiers::ListenerId;
use crate::pool::ConnectionPool;
use crate::root::RootSocket;
use crate::transport::EventCallback;

// ============================================================================
// ScopeBuilder
// ============================================================================

/// What a consumer wants from its socket scope.
enum ScopeTarget {
    /// Acquire from the pool under this target/options.
    Pooled {
        target: String,
        options: ConnectOptions,
    },
    /// Borrow the application-wide root handle.
    Root,
}

/// Declares a scope's target and listeners before binding.
pub struct ScopeBuilder {
    target: ScopeTarget,
    handlers: Vec<(String, EventCallback)>,
}

impl ScopeBuilder {
    /// Starts a pooled scope for `target` (empty string for the pool's base
    /// address) with default options.
    #[must_use]
    pub fn pooled(target: impl Into<String>) -> Self {
        Self {
            target: ScopeTarget::Pooled {
                target: target.into(),
                options: ConnectOptions::default(),
            },
            handlers: Vec::new(),
        }
    }

    /// Starts a scope on the root handle.
    #[must_use]
    pub fn root() -> Self {
        Self {
            target: ScopeTarget::Root,
            handlers: Vec::new(),
        }
    }

    /// Sets the connection options for a pooled scope.
    ///
    /// Ignored in root mode: the root connection's options were fixed at
    /// initialization.
    #[must_use]
    pub fn options(mut self, options: ConnectOptions) -> Self {
        if let ScopeTarget::Pooled {
            options: slot, ..
        } = &mut self.target
        {
            *slot = options;
        }
        self
    }

    /// Declares a listener to register at bind time.
    #[must_use]
    pub fn on(mut self, event: impl Into<String>, callback: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.handlers.push((event.into(), Arc::new(callback)));
        self
    }

    /// Acquires the handle and registers every declared listener.
    ///
    /// Root mode waits for the root handle to become available rather than
    /// creating one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if a pooled target
    /// cannot be normalized.
    pub async fn bind(
        self,
        pool: &Arc<ConnectionPool>,
        root: &RootSocket,
    ) -> Result<SocketScope> {
        let (handle, pooled) = match self.target {
            ScopeTarget::Pooled { target, options } => {
                (pool.acquire(&target, options)?, true)
            }
            ScopeTarget::Root => (root.wait().await, false),
        };

        let registrations = self
            .handlers
            .into_iter()
            .map(|(event, callback)| {
                let id = handle.on(&event, move |payload| (*callback)(payload));
                (event, id)
            })
            .collect();

        Ok(SocketScope {
            handle,
            registrations,
            pooled,
        })
    }
}

// ============================================================================
// SocketScope
// ============================================================================

/// A consumer's live claim on a socket.
///
/// Dropping the scope removes exactly the listeners it registered and, for a
/// pooled scope, releases its reference.
pub struct SocketScope {
    handle: Arc<SocketHandle>,
    registrations: Vec<(String, ListenerId)>,
    pooled: bool,
}

impl SocketScope {
    /// Returns the bound handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Arc<SocketHandle> {
        &self.handle
    }

    /// Returns `true` if this scope holds a pool reference.
    #[inline]
    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Registers an additional listener owned by this scope.
    ///
    /// Removed with the rest on drop.
    pub fn on(&mut self, event: impl Into<String>, callback: impl Fn(Value) + Send + Sync + 'static) {
        let event = event.into();
        let id = self.handle.on(&event, callback);
        self.registrations.push((event, id));
    }

    /// Retargets: fully releases this scope, then binds the new one.
    ///
    /// The old key's listeners are removed and its reference released before
    /// the new acquisition, so a target change never leaks a stale
    /// registration.
    ///
    /// # Errors
    ///
    /// Same as [`ScopeBuilder::bind`].
    pub async fn rebind(
        self,
        builder: ScopeBuilder,
        pool: &Arc<ConnectionPool>,
        root: &RootSocket,
    ) -> Result<SocketScope> {
        drop(self);
        builder.bind(pool, root).await
    }
}

impl Drop for SocketScope {
    fn drop(&mut self) {
        for (event, id) in self.registrations.drain(..) {
            self.handle.off(&event, id);
        }

        if self.pooled {
            self.handle.release();
        } else {
            debug!("Root scope dropped; listeners removed, root left open");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
