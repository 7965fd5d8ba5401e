//! Append-only session output log.
//!
//! [`OutputLog`] is the single ordered record of everything observed during
//! a session attempt. Readers get cheap cloned handles; writes go through a
//! [`LogWriter`] bound to the generation it was created in, so a writer
//! that outlives a reset can never touch the fresh log.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::trace;

use crate::identifiers::Generation;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of error-tagged lines.
pub const ERROR_PREFIX: &str = "[ERROR]";

/// Prefix of separator lines.
pub const SEPARATOR_PREFIX: &str = "---";

/// Separator appended when the remote link closes.
pub const DISCONNECT_SEPARATOR: &str = "--- Connection closed ---";

// ============================================================================
// LineTag
// ============================================================================

/// Presentation class of a line, derived from its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineTag {
    /// Ordinary output.
    Info,
    /// Starts with [`ERROR_PREFIX`].
    Error,
    /// Starts with [`SEPARATOR_PREFIX`].
    Separator,
}

impl LineTag {
    /// Derives the tag of `text`.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        if text.starts_with(ERROR_PREFIX) {
            Self::Error
        } else if text.starts_with(SEPARATOR_PREFIX) {
            Self::Separator
        } else {
            Self::Info
        }
    }
}

// ============================================================================
// OutputLine
// ============================================================================

/// One immutable line of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    index: usize,
    text: String,
    tag: LineTag,
}

impl OutputLine {
    fn new(index: usize, text: String) -> Self {
        let tag = LineTag::classify(&text);
        Self { index, text, tag }
    }

    /// Position in the log, starting at zero.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Line content.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Presentation tag.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> LineTag {
        self.tag
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// OutputLog
// ============================================================================

struct LogState {
    lines: Vec<OutputLine>,
    generation: Generation,
}

struct LogInner {
    state: RwLock<LogState>,
    /// Bumped on every append or reset.
    version: watch::Sender<u64>,
}

/// Shared, append-only, order-preserving line buffer.
///
/// Cloning yields another handle to the same log.
#[derive(Clone)]
pub struct OutputLog {
    inner: Arc<LogInner>,
}

impl fmt::Debug for OutputLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("OutputLog")
            .field("generation", &state.generation)
            .field("len", &state.lines.len())
            .finish()
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLog {
    /// Creates an empty log in [`Generation::INITIAL`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LogInner {
                state: RwLock::new(LogState {
                    lines: Vec::new(),
                    generation: Generation::INITIAL,
                }),
                version: watch::Sender::new(0),
            }),
        }
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().lines.len()
    }

    /// Returns `true` if the log holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().lines.is_empty()
    }

    /// Snapshot of all lines in order.
    #[must_use]
    pub fn lines(&self) -> Vec<OutputLine> {
        self.inner.state.read().lines.clone()
    }

    /// Snapshot of the line texts in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.inner
            .state
            .read()
            .lines
            .iter()
            .map(|line| line.text.clone())
            .collect()
    }

    /// Lines at or after `index`.
    #[must_use]
    pub fn since(&self, index: usize) -> Vec<OutputLine> {
        let state = self.inner.state.read();
        state.lines.get(index..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Current session generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.inner.state.read().generation
    }

    /// Watches for changes. The value increases on every append or reset.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Returns `true` if `generation` is still the live one.
    pub(crate) fn is_current(&self, generation: Generation) -> bool {
        self.inner.state.read().generation == generation
    }

    /// Returns a writer bound to the current generation.
    pub(crate) fn writer(&self) -> LogWriter {
        LogWriter {
            log: self.clone(),
            generation: self.generation(),
        }
    }

    /// Clears every line and starts a new generation.
    ///
    /// Writers from earlier generations become inert.
    pub(crate) fn reset(&self) -> Generation {
        let generation = {
            let mut state = self.inner.state.write();
            state.lines.clear();
            state.generation = state.generation.next();
            state.generation
        };
        self.inner.version.send_modify(|v| *v += 1);
        trace!(%generation, "Output log reset");
        generation
    }

    fn push_in(&self, generation: Generation, text: String) -> bool {
        {
            let mut state = self.inner.state.write();
            if state.generation != generation {
                return false;
            }
            let index = state.lines.len();
            state.lines.push(OutputLine::new(index, text));
        }
        self.inner.version.send_modify(|v| *v += 1);
        true
    }
}

// ============================================================================
// LogWriter
// ============================================================================

/// Append handle pinned to one generation.
///
/// Appends made after the log moved to a newer generation are dropped.
#[derive(Clone)]
pub(crate) struct LogWriter {
    log: OutputLog,
    generation: Generation,
}

impl fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogWriter")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl LogWriter {
    /// Appends a line. Returns `false` if the writer is stale.
    pub(crate) fn write(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        let written = self.log.push_in(self.generation, text);
        if !written {
            trace!(generation = %self.generation, "Dropped stale log line");
        }
        written
    }

    /// Appends an error-tagged line.
    pub(crate) fn error(&self, message: impl fmt::Display) -> bool {
        self.write(format!("{ERROR_PREFIX} {message}"))
    }

    /// The generation this writer belongs to.
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns `true` while the log is still in this writer's generation.
    #[inline]
    pub(crate) fn is_current(&self) -> bool {
        self.log.is_current(self.generation)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_classification() {
        assert_eq!(LineTag::classify("[ERROR] boom"), LineTag::Error);
        assert_eq!(LineTag::classify(DISCONNECT_SEPARATOR), LineTag::Separator);
        assert_eq!(LineTag::classify("Gateway: 192.168.1.1"), LineTag::Info);
        assert_eq!(LineTag::classify("prefix [ERROR]"), LineTag::Info);
    }

    #[test]
    fn test_append_preserves_order_and_indices() {
        let log = OutputLog::new();
        let writer = log.writer();
        assert!(writer.write("A"));
        assert!(writer.error("B failed"));
        assert!(writer.write("C"));

        let lines = log.lines();
        assert_eq!(log.texts(), vec!["A", "[ERROR] B failed", "C"]);
        assert_eq!(lines[1].index(), 1);
        assert_eq!(lines[1].tag(), LineTag::Error);
        assert_eq!(log.since(2).len(), 1);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_reset_clears_and_invalidates_writers() {
        let log = OutputLog::new();
        let stale = log.writer();
        stale.write("before");

        let generation = log.reset();
        assert!(log.is_empty());
        assert_eq!(generation, Generation::INITIAL.next());
        assert!(!stale.is_current());
        assert!(!stale.write("late"));
        assert!(log.is_empty());

        let fresh = log.writer();
        assert_eq!(fresh.generation(), generation);
        assert!(fresh.write("after"));
        assert_eq!(log.texts(), vec!["after"]);
    }

    #[test]
    fn test_subscribe_sees_changes() {
        let log = OutputLog::new();
        let mut rx = log.subscribe();
        assert!(!rx.has_changed().expect("sender alive"));

        log.writer().write("line");
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let log = OutputLog::new();
        let reader = log.clone();
        log.writer().write("shared");
        assert_eq!(reader.len(), 1);
    }
}
