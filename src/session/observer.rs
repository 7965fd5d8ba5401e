//! Output observation over push or poll.
//!
//! An [`OutputObserver`] turns whatever the device agent delivers into one
//! de-duplicated, ordered stream of lines in the [`OutputLog`].
//!
//! | Mode | Source | Dedup |
//! |------|--------|-------|
//! | [`ObserverMode::Push`] | `DeviceAgent::subscribe` | one event = one new line |
//! | [`ObserverMode::Poll`] | `DeviceAgent::output_history` | suffix past the last-seen length |
//!
//! One observer runs one mode for its whole life. To switch, stop it and
//! build a fresh one (which starts from a last-seen length of zero).
//!
//! [`OutputLog`]: super::OutputLog

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, trace, warn};

use crate::agent::AgentHandle;
use crate::error::{Error, Result};
use crate::protocol::AgentEvent;

use super::log::{DISCONNECT_SEPARATOR, LogWriter};

// ============================================================================
// Constants
// ============================================================================

/// Reference poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive poll failures after which the operator is told.
const PERSISTENT_FAILURE_THRESHOLD: u32 = 10;

/// Delay between subscribe attempts in push mode.
const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// ObserverMode
// ============================================================================

/// Delivery mechanism an observer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum ObserverMode {
    /// Asynchronous push events.
    Push,
    /// Periodic full-history poll with suffix diff.
    Poll {
        /// Time between polls.
        #[serde(rename = "intervalMs", serialize_with = "serialize_millis")]
        interval: Duration,
    },
}

impl ObserverMode {
    /// Poll mode at [`DEFAULT_POLL_INTERVAL`].
    #[inline]
    #[must_use]
    pub const fn poll() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Default for ObserverMode {
    fn default() -> Self {
        Self::poll()
    }
}

fn serialize_millis<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

// ============================================================================
// Connectivity
// ============================================================================

/// What the observer has learned about the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Connectivity {
    /// Nothing observed yet.
    Pending,
    /// Output has arrived.
    Confirmed,
    /// The agent reported the link closed.
    Lost,
}

// ============================================================================
// ObserverCore
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct CoreState {
    phase: Phase,
    last_seen: usize,
    consecutive_failures: u32,
}

/// State shared between the observer handle and its task.
///
/// Every append happens under `state`, and `stop` flips the phase under the
/// same lock, so nothing is appended once `stop` returns.
struct ObserverCore {
    writer: LogWriter,
    state: Mutex<CoreState>,
    connectivity: watch::Sender<Connectivity>,
}

impl ObserverCore {
    fn new(writer: LogWriter) -> Self {
        Self {
            writer,
            state: Mutex::new(CoreState {
                phase: Phase::Idle,
                last_seen: 0,
                consecutive_failures: 0,
            }),
            connectivity: watch::Sender::new(Connectivity::Pending),
        }
    }

    /// Moves `Pending` to `Confirmed`; later states are kept.
    fn confirm(&self) {
        let confirmed = self.connectivity.send_if_modified(|current| {
            let pending = *current == Connectivity::Pending;
            if pending {
                *current = Connectivity::Confirmed;
            }
            pending
        });
        if confirmed {
            debug!("Observation confirmed connectivity");
        }
    }

    /// Applies one push event. Returns `false` once stopped.
    fn apply(&self, event: AgentEvent) -> bool {
        let state = self.state.lock();
        if state.phase != Phase::Running {
            return false;
        }
        match event {
            AgentEvent::Line(text) => {
                self.writer.write(text);
                self.confirm();
            }
            AgentEvent::Disconnected => {
                self.writer.write(DISCONNECT_SEPARATOR);
                self.connectivity.send_replace(Connectivity::Lost);
                debug!("Push observation saw disconnect");
            }
            AgentEvent::Error(message) => {
                self.writer.error(message);
            }
        }
        true
    }

    /// Appends whatever `history` holds beyond the last-seen length.
    ///
    /// Returns the number of appended lines, or `None` once stopped.
    fn absorb(&self, history: &[String]) -> Option<usize> {
        let mut state = self.state.lock();
        if state.phase != Phase::Running {
            return None;
        }
        state.consecutive_failures = 0;

        let start = if history.len() < state.last_seen {
            warn!(
                last_seen = state.last_seen,
                len = history.len(),
                "Agent history shrank, treating it as a fresh history"
            );
            0
        } else {
            state.last_seen
        };

        let fresh = &history[start..];
        for line in fresh {
            self.writer.write(line.as_str());
        }
        state.last_seen = history.len();
        self.confirm();

        if !fresh.is_empty() {
            trace!(appended = fresh.len(), total = history.len(), "Poll appended lines");
        }
        Some(fresh.len())
    }

    /// Records a failed poll or subscribe. Returns `false` once stopped.
    fn observation_failed(&self, error: &Error) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Running {
            return false;
        }
        state.consecutive_failures += 1;
        warn!(
            error = %error,
            failures = state.consecutive_failures,
            "Output observation failed"
        );
        if state.consecutive_failures == PERSISTENT_FAILURE_THRESHOLD {
            self.writer
                .error(format!("Output observation keeps failing: {error}"));
        }
        true
    }

    fn is_running(&self) -> bool {
        self.state.lock().phase == Phase::Running
    }
}

// ============================================================================
// OutputObserver
// ============================================================================

/// Background observation of remote output into the log.
pub struct OutputObserver {
    agent: AgentHandle,
    mode: ObserverMode,
    core: Arc<ObserverCore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for OutputObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputObserver")
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .field("generation", &self.core.writer.generation())
            .finish_non_exhaustive()
    }
}

impl OutputObserver {
    /// Creates an idle observer writing through `writer`.
    pub(crate) fn new(agent: AgentHandle, mode: ObserverMode, writer: LogWriter) -> Self {
        Self {
            agent,
            mode,
            core: Arc::new(ObserverCore::new(writer)),
            task: Mutex::new(None),
        }
    }

    /// The delivery mechanism of this observer.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ObserverMode {
        self.mode
    }

    /// What has been learned about the link so far.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        *self.core.connectivity.borrow()
    }

    /// Watches connectivity changes.
    ///
    /// The channel closes once the observer is dropped.
    #[must_use]
    pub fn subscribe_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.core.connectivity.subscribe()
    }

    /// Length of the agent history already appended (poll mode).
    #[must_use]
    pub fn last_seen(&self) -> usize {
        self.core.state.lock().last_seen
    }

    /// Returns `true` between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Begins observation in the background.
    ///
    /// In push mode the subscription is opened before this returns, so
    /// every line the agent holds from then on reaches the log.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] if the observer was already started or stopped.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        {
            let mut state = self.core.state.lock();
            match state.phase {
                Phase::Idle => state.phase = Phase::Running,
                Phase::Running => {
                    return Err(Error::precondition("observer start", "already running"));
                }
                Phase::Stopped => {
                    return Err(Error::precondition(
                        "observer start",
                        "observer was stopped, create a fresh one",
                    ));
                }
            }
        }

        let agent = Arc::clone(&self.agent);
        let core = Arc::clone(&self.core);
        let handle = match self.mode {
            ObserverMode::Push => {
                let events = match self.agent.subscribe() {
                    Ok(events) => Some(events),
                    Err(e) => {
                        self.core.observation_failed(&e);
                        None
                    }
                };
                tokio::spawn(run_push(agent, core, events))
            }
            ObserverMode::Poll { interval } => tokio::spawn(run_poll(agent, core, interval)),
        };
        *task = Some(handle);

        debug!(mode = ?self.mode, "Output observation started");
        Ok(())
    }

    /// Cancels observation. Safe to call any number of times.
    ///
    /// No line is appended after this returns.
    pub fn stop(&self) {
        let previous = {
            let mut state = self.core.state.lock();
            std::mem::replace(&mut state.phase, Phase::Stopped)
        };
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        if previous == Phase::Running {
            debug!(mode = ?self.mode, "Output observation stopped");
        }
    }
}

impl Drop for OutputObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Observation Loops
// ============================================================================

async fn run_push(
    agent: AgentHandle,
    core: Arc<ObserverCore>,
    events: Option<mpsc::UnboundedReceiver<AgentEvent>>,
) {
    let mut events = match events {
        Some(events) => events,
        None => loop {
            sleep(RESUBSCRIBE_DELAY).await;
            match agent.subscribe() {
                Ok(rx) => break rx,
                Err(e) => {
                    if !core.observation_failed(&e) {
                        return;
                    }
                }
            }
        },
    };

    while let Some(event) = events.recv().await {
        trace!(kind = event.kind(), "Push event");
        let terminal = event.is_terminal();
        if !core.apply(event) {
            return;
        }
        if terminal {
            debug!("Push stream ended by disconnect");
            return;
        }
    }

    debug!("Push channel closed");
}

async fn run_poll(agent: AgentHandle, core: Arc<ObserverCore>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let keep_going = match agent.output_history().await {
            Ok(history) => core.absorb(&history).is_some(),
            Err(e) => core.observation_failed(&e),
        };
        if !keep_going {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
