//! Payload delivery and installation verification.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::agent::AgentHandle;
use crate::error::{Error, Result};

use super::connection::ConnectionManager;
use super::log::LogWriter;

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound on the verification probe.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(600);

/// Line appended once the payload reached the device.
pub const INJECTED_LINE: &str = "Script injected successfully!";

/// Line appended while the verification probe runs.
pub const WAITING_LINE: &str = "Waiting for installation...";

/// Line appended on a positive probe.
pub const VERIFIED_LINE: &str = "Installation verified!";

// ============================================================================
// InstallationOutcome
// ============================================================================

/// Result of one injection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "camelCase")]
pub enum InstallationOutcome {
    /// No attempt has finished yet.
    #[default]
    Pending,
    /// The device confirmed the payload took effect.
    Verified,
    /// Sending or verification failed.
    Failed(String),
}

impl InstallationOutcome {
    /// Returns `true` for [`InstallationOutcome::Verified`].
    #[inline]
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Returns `true` for [`InstallationOutcome::Failed`].
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for InstallationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Verified => f.write_str("verified"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ============================================================================
// ScriptInjector
// ============================================================================

/// Sends the payload once, then waits for the device to confirm it.
///
/// Never retries; a new attempt is the caller's decision.
pub struct ScriptInjector {
    agent: AgentHandle,
    connection: Arc<ConnectionManager>,
    verify_timeout: Duration,
}

impl fmt::Debug for ScriptInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInjector")
            .field("verify_timeout", &self.verify_timeout)
            .finish_non_exhaustive()
    }
}

impl ScriptInjector {
    /// Creates an injector that checks `connection` before sending.
    #[must_use]
    pub fn new(
        agent: AgentHandle,
        connection: Arc<ConnectionManager>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            agent,
            connection,
            verify_timeout,
        }
    }

    /// Runs one injection attempt, reporting each phase through `writer`.
    ///
    /// Device-side failures come back as [`InstallationOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] if the link is not live (nothing is logged)
    /// - [`Error::Superseded`] if the log was reset while a phase was in flight
    pub(crate) async fn inject(&self, writer: &LogWriter) -> Result<InstallationOutcome> {
        if !self.connection.status().is_connected() || !self.connection.is_connected().await {
            return Err(Error::precondition("inject", "no live connection to the device"));
        }

        info!("Sending payload");
        let sent = self.agent.inject_script().await;
        if !writer.is_current() {
            return Err(Error::superseded("inject"));
        }
        if let Err(e) = sent {
            warn!(error = %e, "Payload delivery failed");
            writer.error(format!("Failed to send script: {e}"));
            return Ok(InstallationOutcome::Failed(e.to_string()));
        }
        writer.write(INJECTED_LINE);
        writer.write(WAITING_LINE);

        let verdict = match timeout(self.verify_timeout, self.agent.verify_installed()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                "verify",
                self.verify_timeout.as_millis() as u64,
            )),
        };
        if !writer.is_current() {
            return Err(Error::superseded("verify"));
        }

        match verdict {
            Ok(()) => {
                info!("Installation verified");
                writer.write(VERIFIED_LINE);
                Ok(InstallationOutcome::Verified)
            }
            Err(e) => {
                warn!(error = %e, "Installation verification failed");
                writer.error(format!("Failed to verify installation: {e}"));
                Ok(InstallationOutcome::Failed(e.to_string()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
