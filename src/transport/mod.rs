//! Telnet transport layer.
//!
//! This module provides [`TelnetAgent`], the bundled [`DeviceAgent`]
//! implementation, talking to the device shell over plain telnet.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  TelnetAgent    │                              │  Device         │
//! │                 │           Telnet             │                 │
//! │  TelnetLink     │◄────────────────────────────►│  telnetd        │
//! │  → event loop   │        gateway:23            │  (shell)        │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `route::default_gateway` - Find the device address (unless fixed)
//! 2. `TelnetAgent::connect` - Close any previous link, open a new one
//! 3. Event loop - Decode output into lines, write shell commands
//! 4. `TelnetAgent::disconnect` - Close the link and drop subscribers
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Agent configuration and payload source |
//! | `route` | Default gateway lookup |
//! | `telnet` | Telnet link, decoder and agent |
//!
//! [`DeviceAgent`]: crate::agent::DeviceAgent

// ============================================================================
// Submodules
// ============================================================================

/// Agent configuration and payload source.
pub mod options;

/// Default gateway discovery.
pub mod route;

/// Telnet link and device agent.
pub mod telnet;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{DEFAULT_NETWORK_PREFIX, DEFAULT_TELNET_PORT, ScriptSource, TelnetOptions};
pub use route::default_gateway;
pub use telnet::TelnetAgent;
