//! Device-agent protocol vocabulary.
//!
//! This module defines what travels between the session core and the
//! device agent, independent of the transport carrying it.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`ShellCommand`] | Core → Device | One newline-terminated command |
//! | [`AgentEvent`] | Agent → Core | Pushed output line, disconnect, error |
//! | [`VerificationMarkers`] | Device → Core | Installer result lines |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Shell commands and the installation plan |
//! | `event` | Push notification types |

// ============================================================================
// Submodules
// ============================================================================

/// Shell commands and the installation plan.
pub mod command;

/// Push notification types.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    DEFAULT_INSTALL_PATH, DEFAULT_ROLLBACK_MARKER, DEFAULT_SUCCESS_MARKER, InstallDelays,
    InstallPlan, ProbeVerdict, ShellCommand, VerificationMarkers, escape_payload,
};
pub use event::AgentEvent;
