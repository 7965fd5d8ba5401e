//! Workflow controller module.
//!
//! This module provides the entry point presentation collaborators talk to.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionController`] | Workflow state machine over one session |
//! | [`SessionControllerBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | Timers, observer mode, restart variant |
//! | [`WorkflowState`] | Position in the workflow |
//! | [`SessionSnapshot`] | Serializable view of everything rendered |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for controller configuration.
pub mod builder;

/// Core controller implementation.
pub mod core;

/// Session tunables and restart variants.
pub mod options;

/// Workflow state and presentation views.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionControllerBuilder;
pub use core::{CONNECTED_LINE, CONNECT_FAILED_LINE, INSTALL_FAILED_LINE, SessionController};
pub use options::{RestartMode, SessionOptions};
pub use state::{DiagnosticView, Navigation, SessionSnapshot, WorkflowState};
