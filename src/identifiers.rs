//! Type-safe identifiers for correlation and listener bookkeeping.
//!
//! Newtype wrappers prevent mixing incompatible ids at compile time.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`CorrelationId`] | Pairs an ack-style request with its response |
//! | [`ListenerId`] | Names one `(event, callback)` registration |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Unique identifier pairing an ack-style request with its response.
///
/// Generated per request as a UUID v4, so a live id is never reused within a
/// connection's lifetime and collisions are negligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Identifier for one `(event, callback)` registration on a socket.
///
/// Closures are not comparable in Rust, so listener removal is keyed by the id
/// returned at registration time rather than by function identity. Removing an
/// id affects only that exact registration; other listeners for the same event
/// name are untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the next process-unique listener id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_correlation_id_serde_transparent() {
        let id = CorrelationId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        // Serializes as a bare UUID string, per the wire contract.
        assert_eq!(json, format!("\"{id}\""));

        let back: CorrelationId = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, id);
    }

    #[test]
    fn test_listener_id_monotonic() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_listener_id_display() {
        let id = ListenerId::next();
        assert!(id.to_string().starts_with("listener-"));
    }
}
