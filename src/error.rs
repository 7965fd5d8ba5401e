//! Error types for the provisioning session core.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use remote_provisioner::{Result, SessionController};
//!
//! async fn example(controller: &SessionController) -> Result<()> {
//!     controller.start_setup().await?;
//!     controller.execute_injection().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Resolution | [`Error::Resolution`], [`Error::NotOnDeviceNetwork`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Usage | [`Error::Precondition`], [`Error::Superseded`] |
//! | Installation | [`Error::Injection`], [`Error::Verification`], [`Error::RollbackDetected`] |
//! | Observation | [`Error::Observation`] |
//! | Execution | [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Serialize, Serializer};
use thiserror::Error;

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
    /// Returned when controller or agent configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// No gateway could be discovered.
    ///
    /// Fatal to the current attempt, retryable by the operator.
    #[error("Gateway resolution failed: {message}")]
    Resolution {
        /// Description of the resolution failure.
        message: String,
    },

    /// The resolved gateway is outside the device network.
    #[error("Not connected to the device network (gateway {gateway} does not start with '{prefix}')")]
    NotOnDeviceNetwork {
        /// The gateway that was resolved.
        gateway: String,
        /// The subnet prefix the device network uses.
        prefix: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport refused or failed the connection.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt exceeded its timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The remote session is not established or was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Operation invoked in an invalid state.
    ///
    /// Always surfaced, never swallowed.
    #[error("Invalid state for {operation}: {message}")]
    Precondition {
        /// Operation that was refused.
        operation: String,
        /// Why the current state refuses it.
        message: String,
    },

    /// An in-flight operation finished after its session attempt was reset.
    ///
    /// The result has been discarded.
    #[error("Operation superseded: {operation}")]
    Superseded {
        /// Operation whose result was discarded.
        operation: String,
    },

    // ========================================================================
    // Installation Errors
    // ========================================================================
    /// Sending the payload failed on the device side.
    #[error("Script injection failed: {message}")]
    Injection {
        /// Description of the injection failure.
        message: String,
    },

    /// The verification probe reported a failure.
    #[error("Installation verification failed: {message}")]
    Verification {
        /// Description of the verification failure.
        message: String,
    },

    /// The device rolled the installation back.
    #[error("Rollback detected during installation verification")]
    RollbackDetected,

    // ========================================================================
    // Observation Errors
    // ========================================================================
    /// Transient poll or subscribe failure.
    #[error("Observation failed: {message}")]
    Observation {
        /// Description of the observation failure.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
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

    /// Creates a resolution error.
    #[inline]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Creates a not-on-device-network error.
    #[inline]
    pub fn not_on_device_network(gateway: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::NotOnDeviceNetwork {
            gateway: gateway.into(),
            prefix: prefix.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a precondition error.
    #[inline]
    pub fn precondition(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Precondition {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a superseded error.
    #[inline]
    pub fn superseded(operation: impl Into<String>) -> Self {
        Self::Superseded {
            operation: operation.into(),
        }
    }

    /// Creates an injection error.
    #[inline]
    pub fn injection(message: impl Into<String>) -> Self {
        Self::Injection {
            message: message.into(),
        }
    }

    /// Creates a verification error.
    #[inline]
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }

    /// Creates an observation error.
    #[inline]
    pub fn observation(message: impl Into<String>) -> Self {
        Self::Observation {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
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
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionTimeout { .. } | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this is a precondition error.
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }

    /// Returns `true` if this error ends an installation attempt.
    #[inline]
    #[must_use]
    pub fn is_installation_error(&self) -> bool {
        matches!(
            self,
            Self::Injection { .. } | Self::Verification { .. } | Self::RollbackDetected
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the operator retries.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::NotOnDeviceNetwork { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Timeout { .. }
                | Self::Observation { .. }
        )
    }
}

// ============================================================================
// Serialization
// ============================================================================

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> StdResult<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
