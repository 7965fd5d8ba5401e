//! Remote session lifecycle.
//!
//! [`ConnectionManager`] is the only writer of [`ConnectionStatus`].
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!      ▲                        │
//!      │                        └──err──► Error(reason)
//!      └────────── disconnect (from any state) ◄───────┘
//! ```
//!
//! `connect` while `Connected` is a usage error; the caller must disconnect
//! first. `disconnect` always lands in `Disconnected` and is a no-op there.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::agent::AgentHandle;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Status of the remote session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum ConnectionStatus {
    /// No link.
    #[default]
    Disconnected,
    /// Connect attempt in flight.
    Connecting,
    /// Link established.
    Connected,
    /// Last attempt failed or the link was lost.
    Error(String),
}

impl ConnectionStatus {
    /// Returns `true` for [`ConnectionStatus::Connected`].
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` for [`ConnectionStatus::Error`].
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One connect/disconnect lifecycle of the remote link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: SessionId,
    gateway_address: String,
    status: ConnectionStatus,
    started_at: SystemTime,
}

impl Session {
    fn new(gateway_address: &str) -> Self {
        Self {
            id: SessionId::new(),
            gateway_address: gateway_address.to_string(),
            status: ConnectionStatus::Connecting,
            started_at: SystemTime::now(),
        }
    }

    /// Session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Address the session connects to.
    #[inline]
    #[must_use]
    pub fn gateway_address(&self) -> &str {
        &self.gateway_address
    }

    /// Status at the time of the snapshot.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// When the first connect attempt began.
    #[inline]
    #[must_use]
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

struct ManagerState {
    session: Option<Session>,
    status: ConnectionStatus,
    /// Bumped by every connect and disconnect; a completing connect whose
    /// attempt no longer matches is discarded.
    attempt: u64,
}

/// Owner of the session's connect/disconnect lifecycle.
pub struct ConnectionManager {
    agent: AgentHandle,
    connect_timeout: Duration,
    state: Mutex<ManagerState>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionManager")
            .field("status", &state.status)
            .field("session", &state.session.as_ref().map(Session::id))
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager in [`ConnectionStatus::Disconnected`].
    #[must_use]
    pub fn new(agent: AgentHandle, connect_timeout: Duration) -> Self {
        Self {
            agent,
            connect_timeout,
            state: Mutex::new(ManagerState {
                session: None,
                status: ConnectionStatus::Disconnected,
                attempt: 0,
            }),
            status_tx: watch::Sender::new(ConnectionStatus::Disconnected),
        }
    }

    /// Last known status. May be stale; see [`ConnectionManager::is_connected`].
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status.clone()
    }

    /// Snapshot of the current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Watches status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Opens the link to `gateway`.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] if already connected or connecting
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if the agent fails
    /// - [`Error::Superseded`] if a disconnect happened while connecting
    pub async fn connect(&self, gateway: &str) -> Result<()> {
        let attempt = {
            let mut state = self.state.lock();
            match state.status {
                ConnectionStatus::Connected => {
                    return Err(Error::precondition(
                        "connect",
                        "already connected, disconnect first",
                    ));
                }
                ConnectionStatus::Connecting => {
                    return Err(Error::precondition(
                        "connect",
                        "a connection attempt is already in flight",
                    ));
                }
                ConnectionStatus::Disconnected | ConnectionStatus::Error(_) => {}
            }
            state.attempt += 1;
            state.session = Some(Session::new(gateway));
            self.set_status(&mut state, ConnectionStatus::Connecting);
            state.attempt
        };

        info!(gateway = %gateway, attempt, "Connecting to device");

        let result = match timeout(self.connect_timeout, self.agent.connect(gateway)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_connection_error() => Err(e),
            Ok(Err(e)) => Err(Error::connection(e.to_string())),
            Err(_) => Err(Error::connection_timeout(
                self.connect_timeout.as_millis() as u64,
            )),
        };

        let abandoned = {
            let mut state = self.state.lock();
            if state.attempt == attempt {
                return match result {
                    Ok(()) => {
                        self.set_status(&mut state, ConnectionStatus::Connected);
                        info!(gateway = %gateway, "Connected to device");
                        Ok(())
                    }
                    Err(e) => {
                        self.set_status(&mut state, ConnectionStatus::Error(e.to_string()));
                        warn!(gateway = %gateway, error = %e, "Connection failed");
                        Err(e)
                    }
                };
            }
            result.is_ok() && state.session.is_none()
        };

        debug!(attempt, "Discarding superseded connect result");
        if abandoned && let Err(e) = self.agent.disconnect().await {
            debug!(error = %e, "Failed to close abandoned link");
        }
        Err(Error::superseded("connect"))
    }

    /// Live liveness check.
    ///
    /// Asks the agent rather than trusting the cached status. When the
    /// cached status says connected but the link is gone, the status is
    /// corrected to an error.
    pub async fn is_connected(&self) -> bool {
        let live = self.agent.is_connected().await;
        if !live {
            let mut state = self.state.lock();
            if state.status.is_connected() {
                warn!("Link dropped while status said connected");
                self.set_status(
                    &mut state,
                    ConnectionStatus::Error("connection lost".to_string()),
                );
            }
        }
        live
    }

    /// Records that the link of `session` dropped.
    ///
    /// Only a connected status of that same session moves to an error, so a
    /// late report about an earlier session changes nothing. Returns `true`
    /// if the status changed.
    pub fn connection_lost(&self, session: SessionId) -> bool {
        let mut state = self.state.lock();
        let current = state.session.as_ref().map(Session::id) == Some(session);
        if !current || !state.status.is_connected() {
            return false;
        }
        warn!(%session, "Device closed the link");
        self.set_status(
            &mut state,
            ConnectionStatus::Error("connection lost".to_string()),
        );
        true
    }

    /// Closes the link. A no-op when already disconnected.
    ///
    /// Status is `Disconnected` afterwards even if the agent reports an error.
    pub async fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.attempt += 1;
            if state.session.is_none() && state.status == ConnectionStatus::Disconnected {
                return Ok(());
            }
            state.session = None;
            self.set_status(&mut state, ConnectionStatus::Disconnected);
        }

        debug!("Disconnecting from device");
        self.agent.disconnect().await.inspect_err(|e| {
            warn!(error = %e, "Agent failed to disconnect cleanly");
        })
    }

    /// Disconnects (ignoring failure) and connects again.
    ///
    /// No further retry on failure; the status shows the error.
    pub async fn reconnect(&self, gateway: &str) -> Result<()> {
        if let Err(e) = self.disconnect().await {
            debug!(error = %e, "Ignoring disconnect failure before reconnect");
        }
        self.connect(gateway).await
    }

    fn set_status(&self, state: &mut ManagerState, status: ConnectionStatus) {
        if let Some(session) = state.session.as_mut() {
            session.status = status.clone();
        }
        state.status = status.clone();
        self.status_tx.send_replace(status);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::testing::ScriptedAgent;

    fn manager(agent: &Arc<ScriptedAgent>) -> ConnectionManager {
        ConnectionManager::new(agent.handle(), DEFAULT_CONNECT_TIMEOUT)
    }

    #[tokio::test]
    async fn test_connect_success() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);
        let mut status = manager.subscribe();

        manager.connect("192.168.1.1").await.expect("connect");

        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);
        let session = manager.session().expect("session");
        assert_eq!(session.gateway_address(), "192.168.1.1");
        assert!(session.status().is_connected());
    }

    #[tokio::test]
    async fn test_connect_while_connected_fails_fast() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);
        manager.connect("192.168.1.1").await.expect("connect");

        let err = manager.connect("192.168.1.1").await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(ScriptedAgent::calls(&agent.connect_calls), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error() {
        let agent = ScriptedAgent::new();
        agent.refuse_connect(Some("refused"));
        let manager = manager(&agent);

        let err = manager.connect("192.168.1.1").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(manager.status().is_error());

        agent.refuse_connect(None);
        manager.connect("192.168.1.1").await.expect("retry from error");
        assert!(manager.status().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let agent = ScriptedAgent::new();
        agent.set_connect_delay(Duration::from_secs(60));
        let manager = ConnectionManager::new(agent.handle(), Duration::from_secs(1));

        let err = manager.connect("192.168.1.1").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 1000 }));
        assert!(manager.status().is_error());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);

        manager.disconnect().await.expect("noop disconnect");
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(ScriptedAgent::calls(&agent.disconnect_calls), 0);

        manager.connect("192.168.1.1").await.expect("connect");
        manager.disconnect().await.expect("disconnect");
        manager.disconnect().await.expect("second disconnect");
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(manager.session().is_none());
        assert_eq!(ScriptedAgent::calls(&agent.disconnect_calls), 1);
    }

    #[tokio::test]
    async fn test_is_connected_reconciles_stale_status() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);
        manager.connect("192.168.1.1").await.expect("connect");

        agent.drop_link();
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert!(!manager.is_connected().await);
        assert!(manager.status().is_error());
    }

    #[tokio::test]
    async fn test_connection_lost_only_affects_its_session() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);
        manager.connect("192.168.1.1").await.expect("connect");
        let first = manager.session().expect("session").id();

        manager.disconnect().await.expect("disconnect");
        manager.connect("192.168.1.1").await.expect("connect again");
        assert!(!manager.connection_lost(first));
        assert_eq!(manager.status(), ConnectionStatus::Connected);

        let second = manager.session().expect("session").id();
        assert!(manager.connection_lost(second));
        assert_eq!(
            manager.status(),
            ConnectionStatus::Error("connection lost".to_string())
        );
        assert!(!manager.connection_lost(second));
    }

    #[tokio::test]
    async fn test_reconnect_from_connected() {
        let agent = ScriptedAgent::new();
        let manager = manager(&agent);
        manager.connect("192.168.1.1").await.expect("connect");

        manager.reconnect("192.168.1.1").await.expect("reconnect");
        assert!(manager.status().is_connected());
        assert_eq!(ScriptedAgent::calls(&agent.disconnect_calls), 1);
        assert_eq!(ScriptedAgent::calls(&agent.connect_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_connect_discards_result() {
        let agent = ScriptedAgent::new();
        agent.set_connect_delay(Duration::from_secs(5));
        let manager = Arc::new(manager(&agent));

        let connecting = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect("192.168.1.1").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(manager.status(), ConnectionStatus::Connecting);

        manager.disconnect().await.expect("disconnect");
        let result = connecting.await.expect("join");

        assert!(matches!(result, Err(Error::Superseded { .. })));
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(!agent.is_connected_now());
    }
}
