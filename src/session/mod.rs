//! Session core components.
//!
//! Everything with state, ordering, or failure handling lives here. The
//! [`SessionController`](crate::SessionController) composes these pieces
//! into the provisioning workflow.
//!
//! # Ownership
//!
//! ```text
//! ConnectionManager ──owns──► ConnectionStatus
//! OutputObserver ────writes─► OutputLog ◄──writes── controller, injector, gate
//! MonitorGate ───────owns───► enabled flag
//! ```
//!
//! Writers hold a generation-pinned handle to the log, so anything still in
//! flight after a reset cannot append to the fresh log.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connect/disconnect lifecycle and status |
//! | `gate` | Timer-gated diagnostic view flag |
//! | `gateway` | Device address discovery |
//! | `injector` | Payload delivery and verification |
//! | `log` | Append-only output log |
//! | `observer` | Push and poll output observation |

// ============================================================================
// Submodules
// ============================================================================

/// Connect/disconnect lifecycle and status.
pub mod connection;

/// Timer-gated diagnostic view flag.
pub mod gate;

/// Device address discovery.
pub mod gateway;

/// Payload delivery and verification.
pub mod injector;

/// Append-only output log.
pub mod log;

/// Push and poll output observation.
pub mod observer;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionManager, ConnectionStatus, DEFAULT_CONNECT_TIMEOUT, Session};
pub use gate::{DEFAULT_MONITOR_DELAY, MONITOR_READY_LINE, MonitorGate};
pub use gateway::GatewayResolver;
pub use injector::{DEFAULT_VERIFY_TIMEOUT, InstallationOutcome, ScriptInjector};
pub use log::{DISCONNECT_SEPARATOR, ERROR_PREFIX, LineTag, OutputLine, OutputLog};
pub use observer::{Connectivity, DEFAULT_POLL_INTERVAL, ObserverMode, OutputObserver};

pub(crate) use log::LogWriter;
