//! Root connection manager.
//!
//! One [`RootSocket`] is owned by the application shell. It holds the single
//! root [`SocketHandle`]: created at most once per manager lifetime, exempt
//! from pool refcounting, and closed only by an explicit [`RootSocket::teardown`].
//!
//! Consumers that want the root handle but may run before the shell has
//! initialized it use [`RootSocket::wait`], which resolves once the handle
//! exists; waiting never creates a duplicate root connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::handle::SocketHandle;
use crate::transport::Connection;

// ============================================================================
// RootSocket
// ============================================================================

/// Holder of the application-wide root handle.
pub struct RootSocket {
    /// The singleton handle and the address it was created for.
    slot: Mutex<Option<RootSlot>>,
    /// Wakes `wait` callers when the slot is populated.
    ready: Notify,
}

struct RootSlot {
    handle: Arc<SocketHandle>,
    url: Url,
}

impl Default for RootSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl RootSocket {
    /// Creates an uninitialized manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Notify::new(),
        }
    }

    /// Initializes the root handle, once.
    ///
    /// Idempotent: a repeat call returns the existing handle. A repeat call
    /// with a *different* address is a lifecycle mismatch; the new address is
    /// ignored with a warning and the existing handle returned. The root
    /// connection always auto-reconnects regardless of the passed options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `address` is not a valid URL.
    pub fn initialize(&self, address: &str, options: ConnectOptions) -> Result<Arc<SocketHandle>> {
        let url = Url::parse(address)
            .map_err(|e| Error::config(format!("invalid root address {address:?}: {e}")))?;

        let mut slot = self.slot.lock();

        if let Some(existing) = slot.as_ref() {
            if existing.url != url {
                warn!(
                    current = %existing.url,
                    requested = %url,
                    "Root already initialized; new address ignored"
                );
            } else {
                debug!(%url, "Root already initialized");
            }
            return Ok(Arc::clone(&existing.handle));
        }

        let connection = Connection::open(url.clone(), options.auto_reconnect(true));
        let handle = Arc::new(SocketHandle::root(connection));
        *slot = Some(RootSlot {
            handle: Arc::clone(&handle),
            url: url.clone(),
        });
        drop(slot);

        self.ready.notify_waiters();
        info!(%url, "Root connection initialized");
        Ok(handle)
    }

    /// Returns the root handle if initialized.
    #[must_use]
    pub fn get(&self) -> Option<Arc<SocketHandle>> {
        self.slot.lock().as_ref().map(|s| Arc::clone(&s.handle))
    }

    /// Returns `true` once the root handle exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Waits until the root handle exists and returns it.
    pub async fn wait(&self) -> Arc<SocketHandle> {
        loop {
            // Arm the waiter before checking, so an initialize between the
            // check and the await cannot be missed.
            let notified = self.ready.notified();

            if let Some(handle) = self.get() {
                return handle;
            }
            notified.await;
        }
    }

    /// Closes the root connection and clears the slot.
    ///
    /// Intended to run once, at application shutdown; a subsequent
    /// [`RootSocket::initialize`] starts fresh.
    pub fn teardown(&self) {
        let taken = self.slot.lock().take();

        match taken {
            Some(slot) => {
                slot.handle.close();
                info!(url = %slot.url, "Root connection torn down");
            }
            None => debug!("Teardown with no root connection; ignored"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
