//! Session tunables.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use remote_provisioner::{ObserverMode, RestartMode, SessionOptions};
//!
//! let options = SessionOptions::new()
//!     .with_observer_mode(ObserverMode::Push)
//!     .with_monitor_delay(Duration::from_secs(5))
//!     .with_back_mode(RestartMode::FullReset);
//!
//! assert!(options.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::session::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MONITOR_DELAY, DEFAULT_VERIFY_TIMEOUT, ObserverMode,
};

// ============================================================================
// RestartMode
// ============================================================================

/// What a restart does after tearing the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartMode {
    /// Return to `Idle`; the operator starts setup again.
    FullReset,
    /// Re-resolve the gateway and connect again right away.
    #[default]
    ReconnectInPlace,
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Configuration of one [`SessionController`](super::SessionController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// How remote output is collected.
    pub observer_mode: ObserverMode,

    /// Delay between injection start and the diagnostic view unlocking.
    #[serde(serialize_with = "serialize_millis")]
    pub monitor_delay: Duration,

    /// Upper bound on one connect attempt.
    #[serde(serialize_with = "serialize_millis")]
    pub connect_timeout: Duration,

    /// Upper bound on the verification probe.
    #[serde(serialize_with = "serialize_millis")]
    pub verify_timeout: Duration,

    /// Restart variant used by `back`.
    pub back_mode: RestartMode,

    /// Confirm the host is on the device network whenever the gateway is resolved.
    pub require_device_network: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_millis<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with the reference defaults.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observer_mode: ObserverMode::poll(),
            monitor_delay: DEFAULT_MONITOR_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            back_mode: RestartMode::ReconnectInPlace,
            require_device_network: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the observer mode.
    #[inline]
    #[must_use]
    pub fn with_observer_mode(mut self, mode: ObserverMode) -> Self {
        self.observer_mode = mode;
        self
    }

    /// Polls every `interval`.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.observer_mode = ObserverMode::Poll { interval };
        self
    }

    /// Sets the monitor gate delay.
    #[inline]
    #[must_use]
    pub fn with_monitor_delay(mut self, delay: Duration) -> Self {
        self.monitor_delay = delay;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the verification timeout.
    #[inline]
    #[must_use]
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Sets the restart variant used by `back`.
    #[inline]
    #[must_use]
    pub fn with_back_mode(mut self, mode: RestartMode) -> Self {
        self.back_mode = mode;
        self
    }

    /// Requires the device-network check on every resolution.
    #[inline]
    #[must_use]
    pub fn with_device_network_required(mut self) -> Self {
        self.require_device_network = true;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error message naming the first zero interval.
    pub fn validate(&self) -> Result<(), String> {
        if let ObserverMode::Poll { interval } = self.observer_mode
            && interval.is_zero()
        {
            return Err("Poll interval must be greater than zero".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if self.verify_timeout.is_zero() {
            return Err("Verify timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
