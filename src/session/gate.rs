//! Timer-gated access to the diagnostic view.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::log::LogWriter;

// ============================================================================
// Constants
// ============================================================================

/// Delay between arming and enabling.
pub const DEFAULT_MONITOR_DELAY: Duration = Duration::from_secs(2);

/// Line appended when the gate opens.
pub const MONITOR_READY_LINE: &str = "Diagnostic monitor available";

// ============================================================================
// MonitorGate
// ============================================================================

struct GateState {
    armed_at: Option<Instant>,
    enabled: bool,
    /// Bumped by every `arm` and `reset`; a timer only fires for its own value.
    arm_seq: u64,
    timer: Option<JoinHandle<()>>,
}

struct GateShared {
    state: Mutex<GateState>,
    enabled: watch::Sender<bool>,
}

/// Boolean that turns true a fixed delay after injection starts.
///
/// Stays true until [`MonitorGate::reset`]. Re-arming restarts the delay.
pub struct MonitorGate {
    delay: Duration,
    shared: Arc<GateShared>,
}

impl fmt::Debug for MonitorGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MonitorGate")
            .field("delay", &self.delay)
            .field("armed", &state.armed_at.is_some())
            .field("enabled", &state.enabled)
            .finish()
    }
}

impl MonitorGate {
    /// Creates a disarmed gate.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            shared: Arc::new(GateShared {
                state: Mutex::new(GateState {
                    armed_at: None,
                    enabled: false,
                    arm_seq: 0,
                    timer: None,
                }),
                enabled: watch::Sender::new(false),
            }),
        }
    }

    /// The configured delay.
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` once the delay has elapsed since the last `arm`.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    /// When the gate was last armed, if it still is.
    #[must_use]
    pub fn armed_at(&self) -> Option<Instant> {
        self.shared.state.lock().armed_at
    }

    /// Watches the enabled flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.enabled.subscribe()
    }

    /// Arms the gate, restarting the delay if a timer is already pending.
    ///
    /// When the timer fires, the gate enables and `writer` gets one line.
    pub(crate) fn arm(&self, writer: LogWriter) {
        let mut state = self.shared.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.arm_seq += 1;
        state.enabled = false;
        state.armed_at = Some(Instant::now());

        let seq = state.arm_seq;
        let delay = self.delay;
        let shared = Arc::clone(&self.shared);
        state.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            {
                let mut state = shared.state.lock();
                if state.arm_seq != seq {
                    return;
                }
                state.enabled = true;
                state.timer = None;
                writer.write(MONITOR_READY_LINE);
                shared.enabled.send_replace(true);
            }
            debug!("Monitor gate enabled");
        }));
        self.shared.enabled.send_replace(false);
        drop(state);

        debug!(delay_ms = self.delay.as_millis() as u64, "Monitor gate armed");
    }

    /// Cancels any pending timer and disables the gate.
    pub fn reset(&self) {
        {
            let mut state = self.shared.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.arm_seq += 1;
            state.armed_at = None;
            state.enabled = false;
            self.shared.enabled.send_replace(false);
        }
    }
}

impl Drop for MonitorGate {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.state.lock().timer.take() {
            timer.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::advance;

    use crate::session::OutputLog;

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enables_after_delay_exactly_once() {
        let log = OutputLog::new();
        let gate = MonitorGate::new(DEFAULT_MONITOR_DELAY);

        gate.arm(log.writer());
        assert!(!gate.enabled());
        assert!(gate.armed_at().is_some());

        advance(Duration::from_millis(1999)).await;
        settle().await;
        assert!(!gate.enabled());

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert!(gate.enabled());
        assert_eq!(log.texts(), vec![MONITOR_READY_LINE]);

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(gate.enabled());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_restarts_timer() {
        let log = OutputLog::new();
        let gate = MonitorGate::new(Duration::from_secs(5));

        gate.arm(log.writer());
        advance(Duration::from_secs(4)).await;
        settle().await;
        gate.arm(log.writer());

        advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(!gate.enabled());

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(gate.enabled());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_timer() {
        let log = OutputLog::new();
        let gate = MonitorGate::new(DEFAULT_MONITOR_DELAY);
        let mut enabled = gate.subscribe();

        gate.arm(log.writer());
        gate.reset();
        assert!(gate.armed_at().is_none());

        advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(!gate.enabled());
        assert!(log.is_empty());
        assert!(!*enabled.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_disables_enabled_gate() {
        let log = OutputLog::new();
        let gate = MonitorGate::new(Duration::from_millis(10));

        gate.arm(log.writer());
        advance(Duration::from_millis(10)).await;
        settle().await;
        assert!(gate.enabled());
        assert!(*gate.subscribe().borrow());

        gate.reset();
        assert!(!gate.enabled());
        assert!(!*gate.subscribe().borrow());
    }
}
