//! Shell commands sent over the remote session.
//!
//! Installation is a fixed three-step plan:
//!
//! | Step | Command | Settle |
//! |------|---------|--------|
//! | write | `echo -e '<payload>' > <path>` | 2s |
//! | mark executable | `chmod +x <path>` | 1s |
//! | run | `cd <dir> && ./<file>` | 1s |
//!
//! The installer reports its result by printing one of two marker lines,
//! matched by [`VerificationMarkers`].

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Where the installer script is written on the device.
pub const DEFAULT_INSTALL_PATH: &str = "/data/local/tmp/install.sh";

/// Line printed by the installer once the payload took effect.
pub const DEFAULT_SUCCESS_MARKER: &str = "fb5f2f27be2de104ac2b192f3e874dda";

/// Line printed by the installer when it rolled back.
pub const DEFAULT_ROLLBACK_MARKER: &str = "fff66e9b3d962fa319c8068b5c1997cd";

// ============================================================================
// ShellCommand
// ============================================================================

/// A single command line plus the time the device needs before the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    line: String,
    settle: Duration,
}

impl ShellCommand {
    /// Creates a command with no settle delay.
    #[inline]
    #[must_use]
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            settle: Duration::ZERO,
        }
    }

    /// Sets the delay to wait after sending.
    #[inline]
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Returns the command text without terminator.
    #[inline]
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Returns the settle delay.
    #[inline]
    #[must_use]
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Returns the bytes to write, newline-terminated.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.line.len() + 1);
        bytes.extend_from_slice(self.line.as_bytes());
        bytes.push(b'\n');
        bytes
    }
}

// ============================================================================
// InstallDelays
// ============================================================================

/// Settle delays between installation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallDelays {
    /// After writing the script file.
    pub write: Duration,
    /// After marking it executable.
    pub chmod: Duration,
    /// After launching it.
    pub run: Duration,
}

impl Default for InstallDelays {
    fn default() -> Self {
        Self {
            write: Duration::from_secs(2),
            chmod: Duration::from_secs(1),
            run: Duration::from_secs(1),
        }
    }
}

impl InstallDelays {
    /// No delays at all. Useful against local fakes.
    pub const NONE: Self = Self {
        write: Duration::ZERO,
        chmod: Duration::ZERO,
        run: Duration::ZERO,
    };
}

// ============================================================================
// InstallPlan
// ============================================================================

/// Ordered commands that write, mark and run the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    commands: Vec<ShellCommand>,
}

impl InstallPlan {
    /// Builds the plan for `payload` written to `install_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `install_path` is not an absolute file path.
    pub fn new(payload: &str, install_path: &str, delays: InstallDelays) -> Result<Self> {
        let path = Path::new(install_path);
        let (Some(dir), Some(file)) = (path.parent(), path.file_name()) else {
            return Err(Error::config(format!(
                "Install path must name a file: {install_path}"
            )));
        };
        if !path.is_absolute() {
            return Err(Error::config(format!(
                "Install path must be absolute: {install_path}"
            )));
        }

        let write = ShellCommand::new(format!(
            "echo -e '{}' > {install_path}",
            escape_payload(payload)
        ))
        .with_settle(delays.write);
        let chmod = ShellCommand::new(format!("chmod +x {install_path}")).with_settle(delays.chmod);
        let run = ShellCommand::new(format!(
            "cd {} && ./{}",
            dir.display(),
            file.to_string_lossy()
        ))
        .with_settle(delays.run);

        Ok(Self {
            commands: vec![write, chmod, run],
        })
    }

    /// Returns the commands in send order.
    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }
}

/// Escapes a script so it survives `echo -e '...'` as a single line.
///
/// Newlines become `\n` and single quotes are closed, escaped and reopened.
#[must_use]
pub fn escape_payload(payload: &str) -> String {
    payload
        .split('\n')
        .map(|line| line.replace('\'', r"'\''"))
        .collect::<Vec<_>>()
        .join(r"\n")
}

// ============================================================================
// VerificationMarkers
// ============================================================================

/// What a probe line said about the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The payload took effect.
    Installed,
    /// The device rolled the installation back.
    RolledBack,
}

/// Marker lines the installer prints when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMarkers {
    /// Success marker, compared case-insensitively.
    pub success: String,
    /// Rollback marker, compared case-insensitively.
    pub rollback: String,
}

impl Default for VerificationMarkers {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_MARKER.to_string(),
            rollback: DEFAULT_ROLLBACK_MARKER.to_string(),
        }
    }
}

impl VerificationMarkers {
    /// Classifies one output line. Unrelated lines yield `None`.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<ProbeVerdict> {
        let line = line.trim();
        if line.eq_ignore_ascii_case(&self.success) {
            Some(ProbeVerdict::Installed)
        } else if line.eq_ignore_ascii_case(&self.rollback) {
            Some(ProbeVerdict::RolledBack)
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
