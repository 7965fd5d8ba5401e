//! Push notification types.
//!
//! Events are notifications sent from the device agent to the session core
//! while a remote session is live.
//!
//! # Event Types
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `line` | One new line of remote output |
//! | `disconnected` | The remote link closed |
//! | `error` | The agent hit a read or transport error |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// AgentEvent
// ============================================================================

/// A notification from the device agent.
///
/// # Format
///
/// ```json
/// { "type": "line", "payload": "install: step 1/4" }
/// { "type": "disconnected" }
/// { "type": "error", "payload": "connection reset by peer" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum AgentEvent {
    /// Exactly one new line of output.
    Line(String),

    /// The remote link closed.
    Disconnected,

    /// The agent reported an error.
    Error(String),
}

impl AgentEvent {
    /// Creates a line event.
    #[inline]
    #[must_use]
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line(text.into())
    }

    /// Creates an error event.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Returns the event tag.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Disconnected => "disconnected",
            Self::Error(_) => "error",
        }
    }

    /// Returns `true` if this event ends the push stream.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let line = AgentEvent::line("hello");
        assert_eq!(line.kind(), "line");
        assert!(!line.is_terminal());

        assert_eq!(AgentEvent::Disconnected.kind(), "disconnected");
        assert!(AgentEvent::Disconnected.is_terminal());
        assert!(!AgentEvent::error("reset").is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&AgentEvent::error("reset")).expect("serialize");
        assert_eq!(json, r#"{"type":"error","payload":"reset"}"#);

        let json = serde_json::to_string(&AgentEvent::Disconnected).expect("serialize");
        assert_eq!(json, r#"{"type":"disconnected"}"#);
    }
}
