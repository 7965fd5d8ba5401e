//! Builder pattern for controller configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use remote_provisioner::{RestartMode, SessionController, TelnetAgent, TelnetOptions};
//!
//! # fn example() -> remote_provisioner::Result<()> {
//! let agent = TelnetAgent::new(TelnetOptions::new().with_payload("echo hello"));
//! let controller = SessionController::builder()
//!     .agent(agent.handle())
//!     .monitor_delay(Duration::from_secs(5))
//!     .back_mode(RestartMode::FullReset)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::agent::AgentHandle;
use crate::error::{Error, Result};
use crate::session::ObserverMode;

use super::core::SessionController;
use super::options::{RestartMode, SessionOptions};

// ============================================================================
// SessionControllerBuilder
// ============================================================================

/// Builder for configuring a [`SessionController`].
///
/// Use [`SessionController::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionControllerBuilder {
    /// Device agent the session runs against.
    agent: Option<AgentHandle>,
    /// Session tunables.
    options: SessionOptions,
}

impl fmt::Debug for SessionControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionControllerBuilder")
            .field("agent", &self.agent.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// SessionControllerBuilder Implementation
// ============================================================================

impl SessionControllerBuilder {
    /// Creates a builder with default options and no agent.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the device agent.
    #[inline]
    #[must_use]
    pub fn agent(mut self, agent: AgentHandle) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the observer mode.
    #[inline]
    #[must_use]
    pub fn observer_mode(mut self, mode: ObserverMode) -> Self {
        self.options.observer_mode = mode;
        self
    }

    /// Sets the monitor gate delay.
    #[inline]
    #[must_use]
    pub fn monitor_delay(mut self, delay: Duration) -> Self {
        self.options.monitor_delay = delay;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Sets the verification timeout.
    #[inline]
    #[must_use]
    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.options.verify_timeout = timeout;
        self
    }

    /// Sets the restart variant used by `back`.
    #[inline]
    #[must_use]
    pub fn back_mode(mut self, mode: RestartMode) -> Self {
        self.options.back_mode = mode;
        self
    }

    /// Requires the device-network check on every resolution.
    #[inline]
    #[must_use]
    pub fn require_device_network(mut self, required: bool) -> Self {
        self.options.require_device_network = required;
        self
    }

    /// Builds the controller with validation.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no agent is set or an interval is zero.
    pub fn build(self) -> Result<SessionController> {
        let agent = self.agent.ok_or_else(|| {
            Error::config(
                "Device agent is required. Use .agent() to set it.\n\
                 Example: SessionController::builder().agent(agent.handle())",
            )
        })?;
        self.options.validate().map_err(Error::config)?;

        Ok(SessionController::new(agent, self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================
