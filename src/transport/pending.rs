//! Pending acknowledgment table.
//!
//! A small reusable primitive: correlation id → oneshot resolver. Each entry
//! settles exactly once, through one of three paths:
//!
//! 1. a matching [`AckResponse`](crate::protocol::AckResponse) arrives;
//! 2. the caller's timer fires and the entry is discarded (a late response
//!    then finds nothing and is dropped);
//! 3. the connection closes and every entry is failed with
//!    [`Error::ConnectionClosed`](crate::error::Error::ConnectionClosed).
//!
//! The entry is removed from the table in all three outcomes.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::AckResponse;

// ============================================================================
// Types
// ============================================================================

/// Resolver half for one pending request.
pub type AckSender = oneshot::Sender<Result<Value>>;

// ============================================================================
// PendingAcks
// ============================================================================

/// Table of outstanding ack-style requests for one connection.
#[derive(Default)]
pub struct PendingAcks {
    table: Mutex<FxHashMap<CorrelationId, AckSender>>,
}

impl PendingAcks {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outstanding requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns `true` if no requests are outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Registers a resolver for `id`.
    ///
    /// Ids are UUID v4, so a live id is never reinserted in practice; if it
    /// ever were, the displaced resolver is dropped, which surfaces to its
    /// caller as a closed channel.
    pub fn insert(&self, id: CorrelationId, tx: AckSender) {
        self.table.lock().insert(id, tx);
    }

    /// Removes and returns the resolver for `id`, if still present.
    ///
    /// Used by the write path to fail one request whose send never went out.
    #[must_use]
    pub fn take(&self, id: CorrelationId) -> Option<AckSender> {
        self.table.lock().remove(&id)
    }

    /// Removes the resolver for `id`, if still present.
    ///
    /// Used by the timeout path so a late response cannot re-settle.
    pub fn discard(&self, id: CorrelationId) {
        if self.table.lock().remove(&id).is_some() {
            debug!(correlation_id = %id, "Discarded timed-out ack entry");
        }
    }

    /// Settles the entry matching `response`, if any.
    ///
    /// A response with no matching entry (already timed out, already settled,
    /// or never ours) is logged and dropped.
    pub fn settle(&self, response: AckResponse) {
        let id = response.correlation_id;
        let tx = self.table.lock().remove(&id);

        match tx {
            Some(tx) => {
                let _ = tx.send(response.into_result());
            }
            None => {
                warn!(correlation_id = %id, "Ack for unknown or already-settled request");
            }
        }
    }

    /// Fails every outstanding request with [`Error::ConnectionClosed`].
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.table.lock().drain().collect();
        let count = drained.len();

        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending acks on connection closure");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
