//! Error types for the connection pool.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wspool::{Result, SocketHandle};
//!
//! async fn example(sock: &SocketHandle) -> Result<()> {
//!     let reply = sock.emit_ack("ping", serde_json::json!({})).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | Acknowledgment | [`Error::AckTimeout`], [`Error::Remote`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Lifecycle misuse (an unbalanced `release`, re-initializing the root socket
//! with a different address) deliberately has no variant here: those
//! operations degrade to no-ops and are reported through `tracing` warnings so
//! that consumer teardown never fails.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned for an invalid target address, or when the base address is
    /// mutated after the first connection has been created.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection closed while an operation was outstanding.
    ///
    /// Returned to every pending acknowledgment request when the underlying
    /// connection closes without reconnecting, or when `close()` is invoked.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Acknowledgment Errors
    // ========================================================================
    /// Acknowledgment timer elapsed with no matching response.
    ///
    /// Recoverable; the caller decides retry policy.
    #[error("Ack {correlation_id} timed out after {timeout_ms}ms")]
    AckTimeout {
        /// The correlation id that timed out.
        correlation_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The peer answered an acknowledgment request with an error field.
    #[error("Remote error: {message}")]
    Remote {
        /// Error message from the peer.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or local limit.
    ///
    /// Returned when the pending-request table is full or a frame cannot be
    /// formed.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error, forwarded unchanged from the transport.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an ack timeout error.
    #[inline]
    pub fn ack_timeout(correlation_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::AckTimeout {
            correlation_id,
            timeout_ms,
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::WebSocket(_))
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AckTimeout { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
