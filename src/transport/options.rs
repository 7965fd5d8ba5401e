//! Telnet agent configuration.
//!
//! # Example
//!
//! ```
//! use remote_provisioner::{InstallDelays, TelnetOptions};
//!
//! let options = TelnetOptions::new()
//!     .with_gateway("192.168.3.1")
//!     .with_payload_file("/opt/provision/install.sh")
//!     .with_delays(InstallDelays::NONE);
//!
//! assert_eq!(options.port, 23);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_INSTALL_PATH, InstallDelays, VerificationMarkers};

// ============================================================================
// Constants
// ============================================================================

/// Standard telnet port.
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Address prefix of the device hotspot network.
pub const DEFAULT_NETWORK_PREFIX: &str = "192.168.3.";

// ============================================================================
// ScriptSource
// ============================================================================

/// Where the installer script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Script text held in memory.
    Inline(String),
    /// Script read from disk on every injection.
    File(PathBuf),
}

impl ScriptSource {
    /// Creates an inline source.
    #[inline]
    #[must_use]
    pub fn inline(script: impl Into<String>) -> Self {
        Self::Inline(script.into())
    }

    /// Creates a file source.
    #[inline]
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Returns the file path for file sources.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Inline(_) => None,
        }
    }

    /// Loads the script text.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Injection`] if the script is empty
    pub async fn load(&self) -> Result<String> {
        let script = match self {
            Self::Inline(script) => script.clone(),
            Self::File(path) => tokio::fs::read_to_string(path).await?,
        };
        if script.trim().is_empty() {
            return Err(Error::injection("installer script is empty"));
        }
        Ok(script)
    }
}

impl Default for ScriptSource {
    fn default() -> Self {
        Self::Inline(String::new())
    }
}

// ============================================================================
// TelnetOptions
// ============================================================================

/// Configuration of a [`TelnetAgent`](super::TelnetAgent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelnetOptions {
    /// Remote shell port.
    pub port: u16,

    /// Fixed gateway, bypassing default gateway discovery.
    pub gateway: Option<String>,

    /// Prefix the gateway must carry to count as the device network.
    pub network_prefix: String,

    /// Installer script.
    pub payload: ScriptSource,

    /// Absolute path the script is written to on the device.
    pub install_path: String,

    /// Settle delays after each installation command.
    pub delays: InstallDelays,

    /// Lines the installer prints when it finishes.
    pub markers: VerificationMarkers,
}

impl Default for TelnetOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TelnetOptions {
    /// Creates options with the reference defaults and an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self {
            port: DEFAULT_TELNET_PORT,
            gateway: None,
            network_prefix: DEFAULT_NETWORK_PREFIX.to_string(),
            payload: ScriptSource::default(),
            install_path: DEFAULT_INSTALL_PATH.to_string(),
            delays: InstallDelays::default(),
            markers: VerificationMarkers::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TelnetOptions {
    /// Sets the remote shell port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Uses a fixed gateway instead of the host's default gateway.
    #[inline]
    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Sets the device network prefix.
    #[inline]
    #[must_use]
    pub fn with_network_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.network_prefix = prefix.into();
        self
    }

    /// Uses `script` as the installer.
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, script: impl Into<String>) -> Self {
        self.payload = ScriptSource::inline(script);
        self
    }

    /// Reads the installer from `path` on every injection.
    #[inline]
    #[must_use]
    pub fn with_payload_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload = ScriptSource::file(path);
        self
    }

    /// Sets the on-device script path.
    #[inline]
    #[must_use]
    pub fn with_install_path(mut self, path: impl Into<String>) -> Self {
        self.install_path = path.into();
        self
    }

    /// Sets the settle delays.
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, delays: InstallDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Sets the verification markers.
    #[inline]
    #[must_use]
    pub fn with_markers(mut self, markers: VerificationMarkers) -> Self {
        self.markers = markers;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = TelnetOptions::default();
        assert_eq!(options.port, DEFAULT_TELNET_PORT);
        assert_eq!(options.network_prefix, "192.168.3.");
        assert_eq!(options.install_path, DEFAULT_INSTALL_PATH);
        assert!(options.gateway.is_none());
    }

    #[tokio::test]
    async fn test_inline_source_loads() {
        let source = ScriptSource::inline("echo hi");
        assert_eq!(source.load().await.expect("load"), "echo hi");
        assert!(source.path().is_none());
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let err = ScriptSource::default().load().await.unwrap_err();
        assert!(err.is_installation_error());
    }

    #[tokio::test]
    async fn test_file_source_loads() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "#!/bin/sh").expect("write");
        writeln!(file, "echo installed").expect("write");

        let source = ScriptSource::file(file.path());
        let script = source.load().await.expect("load");
        assert!(script.contains("echo installed"));
        assert_eq!(source.path(), Some(file.path()));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = ScriptSource::file("/nonexistent/install.sh");
        assert!(matches!(source.load().await, Err(Error::Io(_))));
    }
}
