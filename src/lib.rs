//! Remote Provisioner - Session orchestration for embedded device provisioning.
//!
//! This library drives an operator through provisioning a remote device:
//! find the device gateway, open a remote shell session, inject an installer
//! script, watch its output, verify the result, and recover by restarting.
//!
//! # Architecture
//!
//! The library follows a core/agent split:
//!
//! - **Session core**: state machine, output log, observers, timers
//! - **Device agent**: everything that touches the device, behind [`DeviceAgent`]
//!
//! Key design principles:
//!
//! - One [`SessionController`] owns one session at a time
//! - [`OutputLog`] is the single ordered record every UI renders
//! - Push and poll observation feed the log through the same observer
//! - Every session attempt has a generation; stale completions are dropped
//!
//! # Quick Start
//!
//! ```no_run
//! use remote_provisioner::{Result, SessionController, TelnetAgent, TelnetOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Agent that talks telnet to the device gateway
//!     let agent = TelnetAgent::new(
//!         TelnetOptions::new().with_payload_file("./install.sh"),
//!     );
//!
//!     let controller = SessionController::builder()
//!         .agent(agent.handle())
//!         .build()?;
//!
//!     // Resolve, connect, inject, verify
//!     controller.start_setup().await?;
//!     let outcome = controller.execute_injection().await?;
//!
//!     for line in controller.log().lines() {
//!         println!("{line}");
//!     }
//!     println!("Installation {outcome}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | The [`DeviceAgent`] interface |
//! | [`controller`] | [`SessionController`] and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe identifiers |
//! | [`protocol`] | Agent events and installer commands |
//! | [`session`] | Log, observers, connection, injector, gate |
//! | [`transport`] | Telnet device agent |

// ============================================================================
// Modules
// ============================================================================

/// Device agent interface.
///
/// Implement [`DeviceAgent`] to run the workflow over another transport.
pub mod agent;

/// Workflow controller and configuration.
///
/// Use [`SessionController::builder()`] to create a configured controller.
pub mod controller;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for sessions and log generations.
pub mod identifiers;

/// Agent events and installer command types.
pub mod protocol;

/// Session core components.
///
/// - [`OutputLog`] - Append-only output record
/// - [`OutputObserver`] - Push or poll observation
/// - [`ConnectionManager`] - Link lifecycle and status
pub mod session;

/// Telnet transport layer.
///
/// Reference [`DeviceAgent`] implementation over a telnet shell.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Agent types
pub use agent::{AgentHandle, DeviceAgent};

// Controller types
pub use controller::{
    DiagnosticView, Navigation, RestartMode, SessionController, SessionControllerBuilder,
    SessionOptions, SessionSnapshot, WorkflowState,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Generation, SessionId};

// Protocol types
pub use protocol::{AgentEvent, InstallDelays, InstallPlan, ShellCommand, VerificationMarkers};

// Session types
pub use session::{
    ConnectionManager, ConnectionStatus, Connectivity, InstallationOutcome, LineTag,
    MonitorGate, ObserverMode, OutputLine, OutputLog, OutputObserver, Session,
};

// Transport types
pub use transport::{ScriptSource, TelnetAgent, TelnetOptions};
