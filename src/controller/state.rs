//! Workflow state and the views handed to presentation collaborators.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::identifiers::{Generation, SessionId};
use crate::session::{
    ConnectionStatus, Connectivity, InstallationOutcome, OutputLine, OutputLog,
};

// ============================================================================
// WorkflowState
// ============================================================================

/// Position of the controller in the provisioning workflow.
///
/// ```text
/// Idle → Resolving → Connecting → Ready → Injecting → Verified
///            │            │                   │
///            └────────────┴──► Failed ◄───────┘
///
/// any state ──restart──► Resetting ──► Idle | Resolving
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum WorkflowState {
    /// Waiting for the operator to start setup.
    #[default]
    Idle,
    /// Looking up the device gateway.
    Resolving,
    /// Opening the remote session.
    Connecting,
    /// Connected; injection may start.
    Ready,
    /// Payload sent or being verified.
    Injecting,
    /// Installation confirmed. Terminal until restart.
    Verified,
    /// Setup or installation failed. Terminal until restart.
    Failed(String),
    /// Tearing the session down.
    Resetting,
}

impl WorkflowState {
    /// Returns `true` for [`WorkflowState::Verified`] and [`WorkflowState::Failed`].
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed(_))
    }

    /// Returns `true` while an asynchronous step is in flight.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Resolving | Self::Connecting | Self::Injecting | Self::Resetting
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Resolving => f.write_str("resolving"),
            Self::Connecting => f.write_str("connecting"),
            Self::Ready => f.write_str("ready"),
            Self::Injecting => f.write_str("injecting"),
            Self::Verified => f.write_str("verified"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Resetting => f.write_str("resetting"),
        }
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Signal for the presentation layer to move between screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Navigation {
    /// Installation verified.
    ProceedToSuccess,
    /// Full reset completed.
    ReturnToStart,
}

// ============================================================================
// DiagnosticView
// ============================================================================

/// Read access granted once the monitor gate has opened.
#[derive(Debug, Clone)]
pub struct DiagnosticView {
    gateway: Option<String>,
    log: OutputLog,
}

impl DiagnosticView {
    pub(crate) fn new(gateway: Option<String>, log: OutputLog) -> Self {
        Self { gateway, log }
    }

    /// Gateway of the monitored session.
    #[inline]
    #[must_use]
    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    /// Live handle to the session log.
    #[inline]
    #[must_use]
    pub fn log(&self) -> &OutputLog {
        &self.log
    }
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Everything a presentation collaborator renders, captured at one moment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Workflow position.
    pub state: WorkflowState,
    /// Connection status.
    pub status: ConnectionStatus,
    /// What output observation has learned about the link.
    pub connectivity: Connectivity,
    /// Result of the last injection attempt.
    pub outcome: InstallationOutcome,
    /// Whether the diagnostic view may be opened.
    pub monitor_enabled: bool,
    /// Resolved gateway of the current attempt.
    pub gateway: Option<String>,
    /// Current session, if one exists.
    pub session_id: Option<SessionId>,
    /// Log generation the lines belong to.
    pub generation: Generation,
    /// Log contents.
    pub lines: Vec<OutputLine>,
}

// ============================================================================
// Tests
// ============================================================================
