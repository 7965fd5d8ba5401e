//! Scripted device agent for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::agent::{AgentHandle, DeviceAgent};
use crate::error::{Error, Result};
use crate::protocol::AgentEvent;

/// How the scripted verification probe answers.
#[derive(Debug, Clone)]
pub(crate) enum ProbeScript {
    Installed,
    Fails(String),
    RolledBack,
}

struct ScriptedState {
    gateway: Option<String>,
    on_device_network: bool,
    refuse_connect: Option<String>,
    connect_delay: Duration,
    connected: bool,
    inject_failure: Option<String>,
    probe: ProbeScript,
    probe_delay: Duration,
    history: Vec<String>,
    polls: VecDeque<Result<Vec<String>>>,
    subscribers: Vec<mpsc::UnboundedSender<AgentEvent>>,
}

/// In-memory [`DeviceAgent`] whose answers are set by the test.
pub(crate) struct ScriptedAgent {
    state: Mutex<ScriptedState>,
    pub(crate) connect_calls: AtomicUsize,
    pub(crate) disconnect_calls: AtomicUsize,
    pub(crate) inject_calls: AtomicUsize,
    pub(crate) poll_calls: AtomicUsize,
}

impl ScriptedAgent {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState {
                gateway: Some("192.168.1.1".to_string()),
                on_device_network: true,
                refuse_connect: None,
                connect_delay: Duration::ZERO,
                connected: false,
                inject_failure: None,
                probe: ProbeScript::Installed,
                probe_delay: Duration::ZERO,
                history: Vec::new(),
                polls: VecDeque::new(),
                subscribers: Vec::new(),
            }),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            inject_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn handle(self: &Arc<Self>) -> AgentHandle {
        Arc::clone(self) as AgentHandle
    }

    pub(crate) fn set_gateway(&self, gateway: Option<&str>) {
        self.state.lock().gateway = gateway.map(str::to_string);
    }

    pub(crate) fn set_on_device_network(&self, on: bool) {
        self.state.lock().on_device_network = on;
    }

    pub(crate) fn refuse_connect(&self, reason: Option<&str>) {
        self.state.lock().refuse_connect = reason.map(str::to_string);
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Simulates the remote end dropping the link.
    pub(crate) fn drop_link(&self) {
        self.state.lock().connected = false;
    }

    pub(crate) fn is_connected_now(&self) -> bool {
        self.state.lock().connected
    }

    pub(crate) fn fail_injection(&self, reason: Option<&str>) {
        self.state.lock().inject_failure = reason.map(str::to_string);
    }

    pub(crate) fn set_probe(&self, probe: ProbeScript) {
        self.state.lock().probe = probe;
    }

    pub(crate) fn set_probe_delay(&self, delay: Duration) {
        self.state.lock().probe_delay = delay;
    }

    pub(crate) fn push_history(&self, line: &str) {
        self.state.lock().history.push(line.to_string());
    }

    /// Queues the answer of the next `output_history` call.
    pub(crate) fn queue_poll(&self, result: Result<Vec<String>>) {
        self.state.lock().polls.push_back(result);
    }

    /// Sends `event` to every live subscriber.
    pub(crate) fn emit(&self, event: AgentEvent) {
        self.state
            .lock()
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    pub(crate) fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceAgent for ScriptedAgent {
    async fn resolve_gateway(&self) -> Result<String> {
        self.state
            .lock()
            .gateway
            .clone()
            .ok_or_else(|| Error::resolution("no default route"))
    }

    async fn is_on_device_network(&self) -> Result<()> {
        let state = self.state.lock();
        if state.on_device_network {
            Ok(())
        } else {
            Err(Error::not_on_device_network(
                state.gateway.clone().unwrap_or_default(),
                "192.168.3.",
            ))
        }
    }

    async fn connect(&self, _gateway: &str) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().connect_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut state = self.state.lock();
        if let Some(reason) = state.refuse_connect.clone() {
            return Err(Error::connection(reason));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn inject_script(&self) -> Result<()> {
        self.inject_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if !state.connected {
            return Err(Error::ConnectionClosed);
        }
        match &state.inject_failure {
            Some(reason) => Err(Error::injection(reason.clone())),
            None => Ok(()),
        }
    }

    async fn verify_installed(&self) -> Result<()> {
        let (probe, delay) = {
            let state = self.state.lock();
            (state.probe.clone(), state.probe_delay)
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        match probe {
            ProbeScript::Installed => Ok(()),
            ProbeScript::Fails(reason) => Err(Error::verification(reason)),
            ProbeScript::RolledBack => Err(Error::RollbackDetected),
        }
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<AgentEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        for line in &state.history {
            let _ = tx.send(AgentEvent::Line(line.clone()));
        }
        state.subscribers.push(tx);
        Ok(rx)
    }

    async fn output_history(&self) -> Result<Vec<String>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        match state.polls.pop_front() {
            Some(result) => result,
            None => Ok(state.history.clone()),
        }
    }
}

/// Waits until `log` holds at least `len` lines.
pub(crate) async fn wait_for_len(log: &crate::session::OutputLog, len: usize) {
    let mut changes = log.subscribe();
    let wait = async {
        while log.len() < len {
            if changes.changed().await.is_err() {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("log did not reach expected length");
}
