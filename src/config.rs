//! Connection options and the process-wide default target address.
//!
//! The original deployment configures one base address for the whole
//! application, before any connection exists. [`BaseAddress`] models that as
//! an explicit init-once value instead of hidden module state: it may be set
//! freely until the first resolution, after which further mutation is
//! rejected so that already-pooled connections and later ones cannot diverge.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first reconnect attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Cap for the exponential reconnect backoff.
const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

// ============================================================================
// ConnectOptions
// ============================================================================

/// Options applied when a connection is created for a pool key.
///
/// Options participate in key normalization: the same target requested with
/// different options is a different pool entry.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Reconnect automatically (with backoff) when the connection drops.
    ///
    /// Without this flag a dropped connection terminates and rejects all
    /// pending acknowledgment requests.
    pub auto_reconnect: bool,

    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for the reconnect backoff.
    pub max_reconnect_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
        }
    }
}

impl ConnectOptions {
    /// Sets the auto-reconnect flag.
    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the initial reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the reconnect backoff cap.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }
}

// ============================================================================
// BaseAddress
// ============================================================================

/// Init-once default target address for the pool.
///
/// An empty target string passed to `acquire` resolves to this address.
/// The value is mutable until the first resolution; after that the address is
/// sealed and [`BaseAddress::set`] is rejected, so a pool can never end up
/// half-migrated between two bases.
#[derive(Debug, Default)]
pub struct BaseAddress {
    /// Configured base URL, if any.
    url: RwLock<Option<Url>>,
    /// Set on first resolution; mutation is rejected afterwards.
    sealed: AtomicBool,
}

impl BaseAddress {
    /// Creates an unset base address.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base address.
    ///
    /// May be called repeatedly before the first connection is created; the
    /// last value wins.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `address` is not a valid URL
    /// - [`Error::Config`] if a connection has already been created from this
    ///   base (the address is sealed)
    pub fn set(&self, address: &str) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::config(
                "base address is sealed after first connection",
            ));
        }

        let url = Url::parse(address).map_err(|e| Error::config(format!("invalid base address {address:?}: {e}")))?;

        debug!(%url, "Base address set");
        *self.url.write() = Some(url);
        Ok(())
    }

    /// Returns the configured base address, if any.
    #[must_use]
    pub fn get(&self) -> Option<Url> {
        self.url.read().clone()
    }

    /// Resolves a requested target against this base and seals it.
    ///
    /// An empty target resolves to the base address itself; anything else is
    /// parsed as an absolute URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the target is empty and no base is configured
    /// - [`Error::Config`] if the target is not a valid URL
    pub fn resolve(&self, target: &str) -> Result<Url> {
        let url = if target.is_empty() {
            self.url
                .read()
                .clone()
                .ok_or_else(|| Error::config("empty target and no base address configured"))?
        } else {
            Url::parse(target)
                .map_err(|e| Error::config(format!("invalid target {target:?}: {e}")))?
        };

        // Seal only once a target actually resolved; a failed lookup must not
        // lock out later configuration.
        self.sealed.store(true, Ordering::Release);
        Ok(url)
    }

    /// Returns `true` if the address can no longer be changed.
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = ConnectOptions::default();
        assert!(!opts.auto_reconnect);
        assert_eq!(opts.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(opts.max_reconnect_delay, DEFAULT_MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_options_builder() {
        let opts = ConnectOptions::default()
            .auto_reconnect(true)
            .reconnect_delay(Duration::from_millis(10))
            .max_reconnect_delay(Duration::from_millis(100));
        assert!(opts.auto_reconnect);
        assert_eq!(opts.reconnect_delay, Duration::from_millis(10));
        assert_eq!(opts.max_reconnect_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_set_before_seal() {
        let base = BaseAddress::new();
        base.set("ws://127.0.0.1:9001").expect("first set");
        // Last write wins until sealed.
        base.set("ws://127.0.0.1:9002").expect("second set");

        let url = base.resolve("").expect("resolve empty target");
        assert_eq!(url.as_str(), "ws://127.0.0.1:9002/");
    }

    #[test]
    fn test_set_after_seal_rejected() {
        let base = BaseAddress::new();
        base.set("ws://127.0.0.1:9001").expect("set");
        let _ = base.resolve("").expect("resolve seals");

        assert!(base.is_sealed());
        let err = base.set("ws://127.0.0.1:9002").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_resolve_explicit_target() {
        let base = BaseAddress::new();
        let url = base.resolve("ws://10.0.0.1:4000/sock").expect("resolve");
        assert_eq!(url.as_str(), "ws://10.0.0.1:4000/sock");
    }

    #[test]
    fn test_resolve_empty_without_base() {
        let base = BaseAddress::new();
        let err = base.resolve("").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_failed_resolve_does_not_seal() {
        let base = BaseAddress::new();

        // No base configured yet: both failures leave the address mutable.
        assert!(base.resolve("").is_err());
        assert!(base.resolve("not a url").is_err());
        assert!(!base.is_sealed());

        base.set("ws://127.0.0.1:9001").expect("set after failures");
        let url = base.resolve("").expect("resolve");
        assert_eq!(url.as_str(), "ws://127.0.0.1:9001/");
        assert!(base.is_sealed());
    }

    #[test]
    fn test_invalid_address() {
        let base = BaseAddress::new();
        assert!(base.set("not a url").is_err());
        assert!(base.resolve("also not a url").is_err());
    }
}
