//! Provisioning workflow coordinator.
//!
//! The [`SessionController`] owns one session at a time and drives it
//! through the workflow. Presentation collaborators call its commands and
//! render whatever it reports.
//!
//! # Example
//!
//! ```no_run
//! use remote_provisioner::{SessionController, TelnetAgent, TelnetOptions};
//!
//! # async fn example() -> remote_provisioner::Result<()> {
//! let agent = TelnetAgent::new(TelnetOptions::new().with_payload("echo hello"));
//! let controller = SessionController::builder().agent(agent.handle()).build()?;
//!
//! controller.start_setup().await?;
//! let outcome = controller.execute_injection().await?;
//! println!("installation {outcome}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::agent::AgentHandle;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::session::{
    ConnectionManager, ConnectionStatus, Connectivity, GatewayResolver, InstallationOutcome,
    LogWriter, MonitorGate, OutputLog, OutputObserver, ScriptInjector, Session,
};

use super::builder::SessionControllerBuilder;
use super::options::{RestartMode, SessionOptions};
use super::state::{DiagnosticView, Navigation, SessionSnapshot, WorkflowState};

// ============================================================================
// Constants
// ============================================================================

/// Line appended once the session is up.
pub const CONNECTED_LINE: &str = "Connection established successfully!";

/// Error line appended when connecting fails.
pub const CONNECT_FAILED_LINE: &str = "Failed to connect to device!";

/// Error line appended when installation fails.
pub const INSTALL_FAILED_LINE: &str = "Failed. Click restart to try again!";

const NAVIGATION_CAPACITY: usize = 16;

// ============================================================================
// Types
// ============================================================================

struct WorkflowCore {
    state: WorkflowState,
    outcome: InstallationOutcome,
    gateway: Option<String>,
    observer: Option<OutputObserver>,
}

pub(crate) struct ControllerInner {
    agent: AgentHandle,
    options: SessionOptions,
    resolver: GatewayResolver,
    connection: Arc<ConnectionManager>,
    injector: ScriptInjector,
    gate: MonitorGate,
    log: OutputLog,
    /// Lock order: `workflow` before the log, gate, or observer locks.
    workflow: Mutex<WorkflowCore>,
    state_tx: watch::Sender<WorkflowState>,
    navigation: broadcast::Sender<Navigation>,
}

// ============================================================================
// SessionController
// ============================================================================

/// Coordinator of the provisioning workflow.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    pub(crate) inner: Arc<ControllerInner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let workflow = self.inner.workflow.lock();
        f.debug_struct("SessionController")
            .field("state", &workflow.state)
            .field("gateway", &workflow.gateway)
            .field("generation", &self.inner.log.generation())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionController - Construction
// ============================================================================

impl SessionController {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    pub(crate) fn new(agent: AgentHandle, options: SessionOptions) -> Self {
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&agent),
            options.connect_timeout,
        ));
        let injector = ScriptInjector::new(
            Arc::clone(&agent),
            Arc::clone(&connection),
            options.verify_timeout,
        );
        let (navigation, _) = broadcast::channel(NAVIGATION_CAPACITY);

        Self {
            inner: Arc::new(ControllerInner {
                resolver: GatewayResolver::new(
                    Arc::clone(&agent),
                    options.require_device_network,
                ),
                gate: MonitorGate::new(options.monitor_delay),
                agent,
                connection,
                injector,
                log: OutputLog::new(),
                workflow: Mutex::new(WorkflowCore {
                    state: WorkflowState::Idle,
                    outcome: InstallationOutcome::Pending,
                    gateway: None,
                    observer: None,
                }),
                state_tx: watch::Sender::new(WorkflowState::Idle),
                navigation,
                options,
            }),
        }
    }
}

// ============================================================================
// SessionController - Accessors
// ============================================================================

impl SessionController {
    /// The configuration in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Current workflow state.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.inner.workflow.lock().state.clone()
    }

    /// Last known connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// What output observation has learned about the link.
    ///
    /// `Pending` while no observer runs.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.inner
            .workflow
            .lock()
            .observer
            .as_ref()
            .map_or(Connectivity::Pending, OutputObserver::connectivity)
    }

    /// Current session, if one exists.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.connection.session()
    }

    /// Read handle to the session log.
    #[must_use]
    pub fn log(&self) -> OutputLog {
        self.inner.log.clone()
    }

    /// Whether the diagnostic view may be opened.
    #[must_use]
    pub fn monitor_enabled(&self) -> bool {
        self.inner.gate.enabled()
    }

    /// Result of the last injection attempt.
    #[must_use]
    pub fn outcome(&self) -> InstallationOutcome {
        self.inner.workflow.lock().outcome.clone()
    }

    /// Gateway resolved by the current attempt.
    #[must_use]
    pub fn gateway(&self) -> Option<String> {
        self.inner.workflow.lock().gateway.clone()
    }

    /// Watches workflow state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WorkflowState> {
        self.inner.state_tx.subscribe()
    }

    /// Watches connection status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.connection.subscribe()
    }

    /// Watches the monitor gate.
    #[must_use]
    pub fn subscribe_monitor(&self) -> watch::Receiver<bool> {
        self.inner.gate.subscribe()
    }

    /// Receives navigation signals.
    #[must_use]
    pub fn subscribe_navigation(&self) -> broadcast::Receiver<Navigation> {
        self.inner.navigation.subscribe()
    }

    /// Captures everything a presentation collaborator renders.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let workflow = self.inner.workflow.lock();
        SessionSnapshot {
            state: workflow.state.clone(),
            status: self.inner.connection.status(),
            connectivity: workflow
                .observer
                .as_ref()
                .map_or(Connectivity::Pending, OutputObserver::connectivity),
            outcome: workflow.outcome.clone(),
            monitor_enabled: self.inner.gate.enabled(),
            gateway: workflow.gateway.clone(),
            session_id: self.inner.connection.session().map(|s| s.id()),
            generation: self.inner.log.generation(),
            lines: self.inner.log.lines(),
        }
    }
}

// ============================================================================
// SessionController - Commands
// ============================================================================

impl SessionController {
    /// Resolves the gateway and connects.
    ///
    /// Failures are also reported in the log and the workflow state.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] unless the workflow is idle
    /// - [`Error::Resolution`] / [`Error::NotOnDeviceNetwork`] if no gateway is found
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if connecting fails
    /// - [`Error::Superseded`] if a restart happened meanwhile
    pub async fn start_setup(&self) -> Result<()> {
        let writer = {
            let mut workflow = self.inner.workflow.lock();
            if workflow.state != WorkflowState::Idle {
                return Err(Error::precondition(
                    "start setup",
                    format!("workflow is {}", workflow.state),
                ));
            }
            self.set_state(&mut workflow, WorkflowState::Resolving);
            self.inner.log.writer()
        };

        info!("Starting setup");
        self.setup(writer).await
    }

    /// Sends the payload and waits for verification.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] unless the workflow is ready and the link is live
    /// - [`Error::Superseded`] if a restart happened meanwhile
    pub async fn execute_injection(&self) -> Result<InstallationOutcome> {
        let writer = {
            let mut workflow = self.inner.workflow.lock();
            if workflow.state != WorkflowState::Ready {
                return Err(Error::precondition(
                    "execute injection",
                    format!("workflow is {}", workflow.state),
                ));
            }
            let writer = self.inner.log.writer();
            workflow.outcome = InstallationOutcome::Pending;
            self.set_state(&mut workflow, WorkflowState::Injecting);
            self.inner.gate.arm(writer.clone());
            writer
        };

        info!("Starting injection");
        match self.inner.injector.inject(&writer).await {
            Ok(InstallationOutcome::Verified) => {
                self.advance(&writer, "execute injection", |workflow| {
                    workflow.outcome = InstallationOutcome::Verified;
                    self.set_state(workflow, WorkflowState::Verified);
                })?;
                let _ = self.inner.navigation.send(Navigation::ProceedToSuccess);
                Ok(InstallationOutcome::Verified)
            }
            Ok(outcome) => {
                let reason = match &outcome {
                    InstallationOutcome::Failed(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.advance(&writer, "execute injection", |workflow| {
                    writer.error(INSTALL_FAILED_LINE);
                    workflow.outcome = outcome.clone();
                    self.set_state(workflow, WorkflowState::Failed(reason));
                })?;
                Ok(outcome)
            }
            Err(e @ Error::Superseded { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "Injection refused");
                self.advance(&writer, "execute injection", |workflow| {
                    self.inner.gate.reset();
                    writer.error(format!("{e}. Click restart to try again!"));
                    workflow.outcome = InstallationOutcome::Failed(e.to_string());
                    self.set_state(workflow, WorkflowState::Failed(e.to_string()));
                })?;
                Err(e)
            }
        }
    }

    /// Tears the session down, then either idles or reconnects.
    ///
    /// Accepted in every state, including while another command is in
    /// flight; that command's eventual result is discarded.
    ///
    /// # Errors
    ///
    /// With [`RestartMode::ReconnectInPlace`], the errors of
    /// [`SessionController::start_setup`] except the precondition.
    pub async fn restart(&self, mode: RestartMode) -> Result<()> {
        let (writer, observer) = {
            let mut workflow = self.inner.workflow.lock();
            self.inner.log.reset();
            self.set_state(&mut workflow, WorkflowState::Resetting);
            workflow.outcome = InstallationOutcome::Pending;
            workflow.gateway = None;
            (self.inner.log.writer(), workflow.observer.take())
        };

        info!(?mode, generation = %writer.generation(), "Restarting session");

        if let Some(observer) = observer {
            observer.stop();
        }
        self.inner.gate.reset();
        if let Err(e) = self.inner.connection.disconnect().await {
            warn!(error = %e, "Disconnect failed during restart, continuing");
        }

        match mode {
            RestartMode::FullReset => {
                self.advance(&writer, "restart", |workflow| {
                    self.set_state(workflow, WorkflowState::Idle);
                })?;
                let _ = self.inner.navigation.send(Navigation::ReturnToStart);
                Ok(())
            }
            RestartMode::ReconnectInPlace => {
                self.advance(&writer, "restart", |workflow| {
                    self.set_state(workflow, WorkflowState::Resolving);
                })?;
                self.setup(writer).await
            }
        }
    }

    /// Restarts with the configured `back_mode`.
    ///
    /// # Errors
    ///
    /// See [`SessionController::restart`].
    pub async fn back(&self) -> Result<()> {
        self.restart(self.inner.options.back_mode).await
    }

    /// Grants access to the diagnostic view.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] until the monitor gate has opened.
    pub fn open_diagnostic_view(&self) -> Result<DiagnosticView> {
        if !self.inner.gate.enabled() {
            return Err(Error::precondition(
                "open diagnostic view",
                "monitor is not available yet",
            ));
        }
        Ok(DiagnosticView::new(self.gateway(), self.inner.log.clone()))
    }

    /// Confirms this host is attached to the device network.
    ///
    /// # Errors
    ///
    /// Typically [`Error::NotOnDeviceNetwork`].
    pub async fn check_device_network(&self) -> Result<()> {
        self.inner.resolver.check_device_network().await
    }
}

// ============================================================================
// SessionController - Internal
// ============================================================================

impl SessionController {
    /// Resolving → Connecting → Ready.
    async fn setup(&self, writer: LogWriter) -> Result<()> {
        let gateway = match self.inner.resolver.resolve().await {
            Ok(gateway) => gateway,
            Err(e) => {
                self.advance(&writer, "setup", |workflow| {
                    writer.error(format!("Failed to resolve gateway: {e}"));
                    self.set_state(workflow, WorkflowState::Failed(e.to_string()));
                })?;
                return Err(e);
            }
        };

        self.advance(&writer, "setup", |workflow| {
            writer.write(format!("Gateway: {gateway}"));
            workflow.gateway = Some(gateway.clone());
            self.set_state(workflow, WorkflowState::Connecting);
        })?;

        if let Err(e) = self.inner.connection.connect(&gateway).await {
            if matches!(e, Error::Superseded { .. }) {
                return Err(e);
            }
            self.advance(&writer, "setup", |workflow| {
                writer.error(CONNECT_FAILED_LINE);
                self.set_state(workflow, WorkflowState::Failed(e.to_string()));
            })?;
            return Err(e);
        }

        let observer = OutputObserver::new(
            Arc::clone(&self.inner.agent),
            self.inner.options.observer_mode,
            writer.clone(),
        );
        let connectivity = observer.subscribe_connectivity();
        self.advance(&writer, "setup", |workflow| -> Result<()> {
            writer.write(CONNECTED_LINE);
            observer.start()?;
            workflow.observer = Some(observer);
            self.set_state(workflow, WorkflowState::Ready);
            Ok(())
        })??;

        if let Some(session) = self.inner.connection.session() {
            self.watch_link_loss(connectivity, session.id());
        }

        info!(gateway = %gateway, "Session ready");
        Ok(())
    }

    /// Reports a link loss seen by the observer to the connection owner.
    ///
    /// Ends when the observer is dropped.
    fn watch_link_loss(
        &self,
        mut connectivity: watch::Receiver<Connectivity>,
        session: SessionId,
    ) {
        let connection = Arc::clone(&self.inner.connection);
        tokio::spawn(async move {
            let lost = connectivity
                .wait_for(|c| *c == Connectivity::Lost)
                .await
                .is_ok();
            if lost {
                connection.connection_lost(session);
            }
        });
    }

    /// Runs `apply` under the workflow lock if `writer` is still current.
    fn advance<T>(
        &self,
        writer: &LogWriter,
        operation: &str,
        apply: impl FnOnce(&mut WorkflowCore) -> T,
    ) -> Result<T> {
        let mut workflow = self.inner.workflow.lock();
        if !writer.is_current() {
            debug!(
                operation,
                generation = %writer.generation(),
                "Discarding stale completion"
            );
            return Err(Error::superseded(operation));
        }
        Ok(apply(&mut workflow))
    }

    fn set_state(&self, workflow: &mut WorkflowCore, next: WorkflowState) {
        debug!(from = %workflow.state, to = %next, "Workflow transition");
        workflow.state = next.clone();
        self.inner.state_tx.send_replace(next);
    }
}

// ============================================================================
// Tests
// ============================================================================
