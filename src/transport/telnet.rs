//! Telnet link and the reference device agent.
//!
//! # Event Loop
//!
//! Each link spawns one tokio task that handles:
//!
//! - Inbound bytes: telnet negotiation refused and stripped, ANSI escapes
//!   removed, text split into trimmed non-empty lines
//! - Outbound shell commands from the agent, newline-terminated and flushed
//! - History (poll source) and subscriber fan-out (push source)
//!
//! Every link carries an epoch. History and subscribers belong to the
//! current epoch only, so a loop that outlives its link writes nothing.
//! A new subscriber first receives the epoch's history, then live output.
//!
//! The link slot is never locked across I/O. A connect that finishes after
//! a newer connect or disconnect finds its epoch retired and closes its
//! stream instead of installing it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::agent::{AgentHandle, DeviceAgent};
use crate::error::{Error, Result};
use crate::protocol::{AgentEvent, InstallPlan, ProbeVerdict, ShellCommand};

use super::options::TelnetOptions;
use super::route;

// ============================================================================
// Constants
// ============================================================================

/// Grace period for a link to close before its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Read buffer size.
const READ_CHUNK: usize = 4096;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[()][0-9A-Za-z]").ok());

// ============================================================================
// TelnetDecoder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Incremental telnet stream decoder.
///
/// Option negotiation is refused (`DO` gets `WONT`, `WILL` gets `DONT`) and
/// subnegotiation is skipped. Chunks may split sequences anywhere.
#[derive(Debug)]
pub(crate) struct TelnetDecoder {
    state: DecodeState,
    pending: Vec<u8>,
}

/// Output of one [`TelnetDecoder::feed`] call.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub(crate) lines: Vec<String>,
    pub(crate) replies: Vec<u8>,
}

impl TelnetDecoder {
    pub(crate) fn new() -> Self {
        Self {
            state: DecodeState::Data,
            pending: Vec::new(),
        }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        for &byte in chunk {
            self.state = match (self.state, byte) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                (DecodeState::Data, b'\n') => {
                    if let Some(line) = self.take_line() {
                        out.lines.push(line);
                    }
                    DecodeState::Data
                }
                (DecodeState::Data, b'\r' | 0) => DecodeState::Data,
                (DecodeState::Data, other) => {
                    self.pending.push(other);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    self.pending.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, WILL..=DONT) => DecodeState::Negotiate(byte),
                (DecodeState::Iac, SB) => DecodeState::Sub,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Negotiate(verb), option) => {
                    match verb {
                        DO => out.replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => out.replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    DecodeState::Data
                }
                (DecodeState::Sub, IAC) => DecodeState::SubIac,
                (DecodeState::Sub, _) => DecodeState::Sub,
                (DecodeState::SubIac, SE) => DecodeState::Data,
                (DecodeState::SubIac, _) => DecodeState::Sub,
            };
        }
        out
    }

    /// Returns whatever partial line is left, used at end of stream.
    pub(crate) fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        clean_line(&String::from_utf8_lossy(&raw))
    }
}

/// Strips ANSI escapes and surrounding whitespace. Empty lines yield `None`.
pub(crate) fn clean_line(raw: &str) -> Option<String> {
    let text = match ANSI_ESCAPE.as_ref() {
        Some(pattern) => pattern.replace_all(raw, ""),
        None => raw.into(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Shared State
// ============================================================================

struct SharedState {
    /// Bumped by every connect and disconnect.
    epoch: u64,
    history: Vec<String>,
    subscribers: Vec<mpsc::UnboundedSender<AgentEvent>>,
}

/// Output state shared between the agent and the current link's task.
struct LinkShared {
    state: Mutex<SharedState>,
}

impl LinkShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SharedState {
                epoch: 0,
                history: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Starts a new epoch, dropping history and subscribers.
    fn next_epoch(&self) -> u64 {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.history.clear();
        state.subscribers.clear();
        state.epoch
    }

    fn publish_line(&self, epoch: u64, line: String) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        trace!(line = %line, "Device output");
        state
            .subscribers
            .retain(|tx| tx.send(AgentEvent::Line(line.clone())).is_ok());
        state.history.push(line);
    }

    fn publish(&self, epoch: u64, event: AgentEvent) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Registers a subscriber that first receives the epoch's history.
    ///
    /// Replay and registration share one lock, so no line is missed or
    /// delivered twice.
    fn subscribe_replaying(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        for line in &state.history {
            let _ = tx.send(AgentEvent::Line(line.clone()));
        }
        state.subscribers.push(tx);
        rx
    }

    /// Registers a subscriber that only sees output from now on.
    fn subscribe_live(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }
}

// ============================================================================
// TelnetLink
// ============================================================================

/// Internal commands for the event loop.
enum LinkCommand {
    /// Write one command line.
    Send {
        command: ShellCommand,
        done: oneshot::Sender<Result<()>>,
    },
    /// Close the link.
    Shutdown,
}

/// One open telnet connection and its event loop task.
struct TelnetLink {
    command_tx: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

impl TelnetLink {
    fn spawn(stream: TcpStream, shared: Arc<LinkShared>, epoch: u64) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (reader, writer) = stream.into_split();
        let task = tokio::spawn(Self::run_event_loop(
            reader, writer, command_rx, shared, epoch,
        ));
        Self { command_tx, task }
    }

    fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Sender for the event loop, if the loop is still running.
    fn sender(&self) -> Option<mpsc::UnboundedSender<LinkCommand>> {
        self.is_alive().then(|| self.command_tx.clone())
    }

    async fn send(
        command_tx: &mpsc::UnboundedSender<LinkCommand>,
        command: ShellCommand,
    ) -> Result<()> {
        let (done, rx) = oneshot::channel();
        command_tx
            .send(LinkCommand::Send { command, done })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn close(mut self) {
        let _ = self.command_tx.send(LinkCommand::Shutdown);
        if timeout(SHUTDOWN_GRACE, &mut self.task).await.is_err() {
            debug!("Link task did not stop in time, aborting");
            self.task.abort();
        }
    }

    /// Event loop that handles telnet I/O.
    async fn run_event_loop(
        mut reader: OwnedReadHalf,
        mut writer: OwnedWriteHalf,
        mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
        shared: Arc<LinkShared>,
        epoch: u64,
    ) {
        let mut decoder = TelnetDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            if let Some(line) = decoder.finish() {
                                shared.publish_line(epoch, line);
                            }
                            debug!("Telnet stream closed by remote");
                            shared.publish(epoch, AgentEvent::Disconnected);
                            break;
                        }
                        Ok(n) => {
                            let decoded = decoder.feed(&buf[..n]);
                            if !decoded.replies.is_empty()
                                && let Err(e) = writer.write_all(&decoded.replies).await
                            {
                                warn!(error = %e, "Failed to answer telnet negotiation");
                            }
                            for line in decoded.lines {
                                shared.publish_line(epoch, line);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Telnet read failed");
                            shared.publish(epoch, AgentEvent::error(e.to_string()));
                            shared.publish(epoch, AgentEvent::Disconnected);
                            break;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(LinkCommand::Send { command, done }) => {
                            let result = Self::write_command(&mut writer, &command).await;
                            let _ = done.send(result);
                        }
                        Some(LinkCommand::Shutdown) | None => {
                            debug!("Telnet link shutting down");
                            let _ = writer.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!(epoch, "Telnet event loop terminated");
    }

    async fn write_command(writer: &mut OwnedWriteHalf, command: &ShellCommand) -> Result<()> {
        trace!(command = %command.line(), "Sending shell command");
        writer.write_all(&command.to_wire()).await?;
        writer.flush().await?;
        Ok(())
    }
}

// ============================================================================
// TelnetAgent
// ============================================================================

/// [`DeviceAgent`] over a line-oriented telnet shell.
pub struct TelnetAgent {
    options: TelnetOptions,
    shared: Arc<LinkShared>,
    link: Mutex<Option<TelnetLink>>,
    /// Output subscription opened by the last injection, read by the probe.
    probe: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl fmt::Debug for TelnetAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelnetAgent")
            .field("port", &self.options.port)
            .field("gateway", &self.options.gateway)
            .finish_non_exhaustive()
    }
}

impl TelnetAgent {
    /// Creates a disconnected agent.
    #[must_use]
    pub fn new(options: TelnetOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            shared: Arc::new(LinkShared::new()),
            link: Mutex::new(None),
            probe: Mutex::new(None),
        })
    }

    /// Returns this agent as a shared [`AgentHandle`].
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> AgentHandle {
        Arc::clone(self) as AgentHandle
    }

    /// The configuration in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &TelnetOptions {
        &self.options
    }

    async fn send(&self, command: ShellCommand) -> Result<()> {
        let command_tx = self
            .link
            .lock()
            .as_ref()
            .and_then(TelnetLink::sender)
            .ok_or(Error::ConnectionClosed)?;
        TelnetLink::send(&command_tx, command).await
    }

    /// Takes the current link and retires its epoch.
    fn retire_link(&self) -> (Option<TelnetLink>, u64) {
        let mut link = self.link.lock();
        let epoch = self.shared.next_epoch();
        (link.take(), epoch)
    }
}

#[async_trait]
impl DeviceAgent for TelnetAgent {
    async fn resolve_gateway(&self) -> Result<String> {
        if let Some(gateway) = &self.options.gateway {
            return Ok(gateway.clone());
        }
        route::default_gateway().await.map(|ip| ip.to_string())
    }

    async fn is_on_device_network(&self) -> Result<()> {
        let gateway = self.resolve_gateway().await?;
        if gateway.starts_with(&self.options.network_prefix) {
            Ok(())
        } else {
            Err(Error::not_on_device_network(
                gateway,
                self.options.network_prefix.clone(),
            ))
        }
    }

    async fn connect(&self, gateway: &str) -> Result<()> {
        let (previous, epoch) = self.retire_link();
        if let Some(previous) = previous {
            debug!("Closing previous link before reconnecting");
            previous.close().await;
        }

        let stream = TcpStream::connect((gateway, self.options.port))
            .await
            .map_err(|e| Error::connection(format!("{gateway}:{}: {e}", self.options.port)))?;
        stream.set_nodelay(true)?;

        {
            let mut link = self.link.lock();
            if self.shared.epoch() == epoch {
                *link = Some(TelnetLink::spawn(stream, Arc::clone(&self.shared), epoch));
                info!(gateway = %gateway, port = self.options.port, "Telnet link open");
                return Ok(());
            }
        }

        debug!(epoch, "Link superseded while connecting, closing stream");
        Err(Error::connection(format!(
            "{gateway}:{}: link closed while connecting",
            self.options.port
        )))
    }

    async fn disconnect(&self) -> Result<()> {
        let (previous, _) = self.retire_link();
        self.probe.lock().take();
        if let Some(link) = previous {
            link.close().await;
            debug!("Telnet link closed");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.link.lock().as_ref().is_some_and(TelnetLink::is_alive)
    }

    async fn inject_script(&self) -> Result<()> {
        let payload = self.options.payload.load().await?;
        let plan = InstallPlan::new(&payload, &self.options.install_path, self.options.delays)?;

        *self.probe.lock() = Some(self.shared.subscribe_live());

        for command in plan.commands() {
            self.send(command.clone())
                .await
                .map_err(|e| Error::injection(format!("{}: {e}", command.line())))?;
            if !command.settle().is_zero() {
                sleep(command.settle()).await;
            }
        }

        info!(path = %self.options.install_path, "Installer launched");
        Ok(())
    }

    async fn verify_installed(&self) -> Result<()> {
        let taken = self.probe.lock().take();
        let mut events = match taken {
            Some(events) => events,
            None => self.shared.subscribe_live(),
        };

        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Line(line) => match self.options.markers.classify(&line) {
                    Some(ProbeVerdict::Installed) => return Ok(()),
                    Some(ProbeVerdict::RolledBack) => return Err(Error::RollbackDetected),
                    None => {}
                },
                AgentEvent::Disconnected => return Err(Error::ConnectionClosed),
                AgentEvent::Error(message) => {
                    debug!(error = %message, "Ignoring read error while verifying");
                }
            }
        }
        Err(Error::ConnectionClosed)
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<AgentEvent>> {
        Ok(self.shared.subscribe_replaying())
    }

    async fn output_history(&self) -> Result<Vec<String>> {
        Ok(self.shared.state.lock().history.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::{TcpListener, TcpSocket};

    use crate::protocol::{DEFAULT_ROLLBACK_MARKER, DEFAULT_SUCCESS_MARKER, InstallDelays};

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        (listener, port)
    }

    fn agent(port: u16) -> Arc<TelnetAgent> {
        TelnetAgent::new(
            TelnetOptions::new()
                .with_port(port)
                .with_gateway("127.0.0.1")
                .with_payload("#!/bin/sh\necho 'done'")
                .with_delays(InstallDelays::NONE),
        )
    }

    async fn wait_for_history(agent: &TelnetAgent, len: usize) -> Vec<String> {
        for _ in 0..200 {
            let history = agent.output_history().await.expect("history");
            if history.len() >= len {
                return history;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("history did not reach {len} lines");
    }

    #[test]
    fn test_decoder_splits_and_cleans_lines() {
        let mut decoder = TelnetDecoder::new();
        let first = decoder.feed(b"\x1b[1;32mhello\x1b[0m\r\n\r\n  wor");
        assert_eq!(first.lines, vec!["hello"]);

        let second = decoder.feed(b"ld  \r\n");
        assert_eq!(second.lines, vec!["world"]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_refuses_negotiation() {
        let mut decoder = TelnetDecoder::new();
        let decoded = decoder.feed(&[IAC, DO, 1, IAC, WILL, 3, b'o', b'k', b'\n']);
        assert_eq!(decoded.replies, vec![IAC, WONT, 1, IAC, DONT, 3]);
        assert_eq!(decoded.lines, vec!["ok"]);
    }

    #[test]
    fn test_decoder_handles_split_sequences() {
        let mut decoder = TelnetDecoder::new();
        assert!(decoder.feed(&[b'a', IAC]).lines.is_empty());
        let decoded = decoder.feed(&[SB, 24, 1, IAC, SE, b'b', b'\n']);
        assert_eq!(decoded.lines, vec!["ab"]);
        assert!(decoded.replies.is_empty());
    }

    #[test]
    fn test_decoder_finish_flushes_partial_line() {
        let mut decoder = TelnetDecoder::new();
        decoder.feed(b"root@device:/ # ");
        assert_eq!(decoder.finish().as_deref(), Some("root@device:/ #"));
    }

    #[tokio::test]
    async fn test_output_reaches_history_and_subscribers() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket.write_all(b"banner\r\n").await.expect("write");
            socket
        });

        agent.connect("127.0.0.1").await.expect("connect");
        let mut events = agent.subscribe().expect("subscribe");
        let _socket = server.await.expect("join");

        assert_eq!(wait_for_history(&agent, 1).await, vec!["banner"]);
        assert_eq!(events.recv().await, Some(AgentEvent::line("banner")));
        assert!(agent.is_connected().await);
    }

    #[tokio::test]
    async fn test_late_subscriber_receives_earlier_output() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        agent.connect("127.0.0.1").await.expect("connect");
        let (mut socket, _) = listener.accept().await.expect("accept");
        socket.write_all(b"banner\r\nprompt\r\n").await.expect("write");
        wait_for_history(&agent, 2).await;

        let mut events = agent.subscribe().expect("subscribe");
        socket.write_all(b"live\r\n").await.expect("write");

        assert_eq!(events.recv().await, Some(AgentEvent::line("banner")));
        assert_eq!(events.recv().await, Some(AgentEvent::line("prompt")));
        assert_eq!(events.recv().await, Some(AgentEvent::line("live")));
        assert_eq!(agent.output_history().await.expect("history").len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_while_connect_is_pending() {
        let socket = TcpSocket::new_v4().expect("socket");
        socket
            .bind((std::net::Ipv4Addr::LOCALHOST, 0).into())
            .expect("bind");
        let port = socket.local_addr().expect("addr").port();
        let _listener = socket.listen(0).expect("listen");

        // Fill the accept backlog so further handshakes stall.
        let mut backlog = Vec::new();
        for _ in 0..8 {
            if let Ok(Ok(stream)) =
                timeout(Duration::from_millis(100), TcpStream::connect(("127.0.0.1", port))).await
            {
                backlog.push(stream);
            }
        }

        let agent = agent(port);
        let connecting = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.connect("127.0.0.1").await })
        };
        sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_millis(500), agent.disconnect())
            .await
            .expect("disconnect waited for connect")
            .expect("disconnect");
        let live = timeout(Duration::from_millis(500), agent.is_connected())
            .await
            .expect("liveness check waited for connect");
        assert!(!live);

        if connecting.is_finished() {
            let _ = connecting.await;
            assert!(!agent.is_connected().await);
        } else {
            connecting.abort();
        }
    }

    #[tokio::test]
    async fn test_remote_close_emits_disconnected() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        agent.connect("127.0.0.1").await.expect("connect");
        let mut events = agent.subscribe().expect("subscribe");
        let (socket, _) = listener.accept().await.expect("accept");
        drop(socket);

        assert_eq!(events.recv().await, Some(AgentEvent::Disconnected));
        for _ in 0..100 {
            if !agent.is_connected().await {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("link still reported alive");
    }

    #[tokio::test]
    async fn test_injection_and_verification() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let (reader, mut writer) = socket.into_split();
            let mut lines = BufReader::new(reader).lines();
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(lines.next_line().await.expect("read").expect("line"));
            }
            writer.write_all(b"installing\r\n").await.expect("write");
            writer
                .write_all(format!("{}\r\n", DEFAULT_SUCCESS_MARKER.to_uppercase()).as_bytes())
                .await
                .expect("write");
            (received, writer)
        });

        agent.connect("127.0.0.1").await.expect("connect");
        agent.inject_script().await.expect("inject");
        agent.verify_installed().await.expect("verify");

        let (received, _writer) = server.await.expect("join");
        assert_eq!(
            received,
            vec![
                r"echo -e '#!/bin/sh\necho '\''done'\''' > /data/local/tmp/install.sh",
                "chmod +x /data/local/tmp/install.sh",
                "cd /data/local/tmp && ./install.sh",
            ]
        );
    }

    #[tokio::test]
    async fn test_rollback_marker_fails_verification() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        agent.connect("127.0.0.1").await.expect("connect");
        let (mut socket, _) = listener.accept().await.expect("accept");
        agent.inject_script().await.expect("inject");
        socket
            .write_all(format!("{DEFAULT_ROLLBACK_MARKER}\n").as_bytes())
            .await
            .expect("write");

        assert!(matches!(
            agent.verify_installed().await,
            Err(Error::RollbackDetected)
        ));
    }

    #[tokio::test]
    async fn test_link_loss_fails_verification() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        agent.connect("127.0.0.1").await.expect("connect");
        let (socket, _) = listener.accept().await.expect("accept");
        agent.inject_script().await.expect("inject");
        drop(socket);

        assert!(matches!(
            agent.verify_installed().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_clears_history() {
        let (listener, port) = listener().await;
        let agent = agent(port);

        agent.connect("127.0.0.1").await.expect("connect");
        let (mut first, _) = listener.accept().await.expect("accept");
        first.write_all(b"old\n").await.expect("write");
        wait_for_history(&agent, 1).await;

        agent.connect("127.0.0.1").await.expect("reconnect");
        let (_second, _) = listener.accept().await.expect("accept");
        assert!(agent.output_history().await.expect("history").is_empty());

        agent.disconnect().await.expect("disconnect");
        agent.disconnect().await.expect("second disconnect");
        assert!(!agent.is_connected().await);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let (listener, port) = listener().await;
        drop(listener);
        let agent = agent(port);

        let err = agent.connect("127.0.0.1").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!agent.is_connected().await);
    }

    #[tokio::test]
    async fn test_inject_without_link() {
        let agent = agent(1);
        let err = agent.inject_script().await.unwrap_err();
        assert!(err.is_installation_error());
    }

    #[tokio::test]
    async fn test_device_network_prefix() {
        let agent = TelnetAgent::new(TelnetOptions::new().with_gateway("192.168.3.1"));
        assert!(agent.is_on_device_network().await.is_ok());

        let agent = TelnetAgent::new(TelnetOptions::new().with_gateway("10.0.0.1"));
        assert!(matches!(
            agent.is_on_device_network().await,
            Err(Error::NotOnDeviceNetwork { .. })
        ));
    }
}
