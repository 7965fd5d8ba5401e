//! Device agent interface.
//!
//! The session core never talks to the device directly. Everything it needs
//! (gateway discovery, link lifecycle, payload delivery, verification and
//! output observation) goes through a [`DeviceAgent`].
//!
//! # Operations
//!
//! | Method | Returns | Used by |
//! |--------|---------|---------|
//! | `resolve_gateway` | device address | `GatewayResolver` |
//! | `is_on_device_network` | ok / error | `GatewayResolver` |
//! | `connect` / `disconnect` | ok / error | `ConnectionManager` |
//! | `is_connected` | liveness | `ConnectionManager` |
//! | `inject_script` | ok / error | `ScriptInjector` |
//! | `verify_installed` | ok / error | `ScriptInjector` |
//! | `subscribe` | push channel | `OutputObserver` (push mode) |
//! | `output_history` | full line history | `OutputObserver` (poll mode) |
//!
//! [`crate::transport::TelnetAgent`] is the bundled implementation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::AgentEvent;

// ============================================================================
// Types
// ============================================================================

/// Shared handle to a device agent.
pub type AgentHandle = Arc<dyn DeviceAgent>;

// ============================================================================
// DeviceAgent
// ============================================================================

/// Commands the session core issues against the device.
///
/// Every async method is a suspension point; implementations must tolerate
/// being dropped mid-flight when the operator restarts.
#[async_trait]
pub trait DeviceAgent: Send + Sync + 'static {
    /// Discovers the device's network address.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Resolution`] when no route to the device network exists.
    async fn resolve_gateway(&self) -> Result<String>;

    /// Confirms this host is attached to the device network.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotOnDeviceNetwork`] when the gateway is foreign.
    async fn is_on_device_network(&self) -> Result<()>;

    /// Opens the remote shell link to `gateway`.
    async fn connect(&self, gateway: &str) -> Result<()>;

    /// Closes the remote shell link. Closing a closed link succeeds.
    async fn disconnect(&self) -> Result<()>;

    /// Live check of the link, independent of any cached status.
    async fn is_connected(&self) -> bool;

    /// Transmits the provisioning payload over the live link.
    async fn inject_script(&self) -> Result<()>;

    /// Waits for the device to confirm the payload took effect.
    async fn verify_installed(&self) -> Result<()>;

    /// Opens a push channel of output events.
    ///
    /// Each call returns an independent receiver. It first yields every
    /// line already in the current link's history, then live events, with
    /// nothing missed or repeated in between.
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<AgentEvent>>;

    /// Returns the full ordered line history of the current link.
    async fn output_history(&self) -> Result<Vec<String>>;
}
