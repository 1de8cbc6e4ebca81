//! Session runtime.
//!
//! One tokio task owns the [`SessionEngine`] and the live [`Connection`].
//! It reacts to commands from [`SessionHandle`]s, transport signals,
//! finished connection attempts and history fetches, and engine deadlines,
//! one at a time, and then carries out whatever effects the engine queued.
//! Nothing else touches session state, so no locks are involved.
//!
//! Opening a connection runs in its own task. Frames the engine writes
//! before the handle arrives are held and flushed once it does.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use rl_core::error::{RlError, RlResult};
use rl_models::{ChatMessage, Credential, Room};

use crate::collaborators::{HistoryProvider, OutboundSender};
use crate::correlation::PendingReply;
use crate::engine::{Effect, SessionEngine, SessionOptions, SessionState};
use crate::events::UiSink;
use crate::registry::ChannelKind;
use crate::transport::{Connection, ConnectionId, Connector, TransportSignal};

enum Command {
    Connect(Credential),
    Logout,
    SwitchRoom(Room),
    Subscribe(ChannelKind, String),
    Call {
        method: String,
        params: Vec<Value>,
        reply: oneshot::Sender<PendingReply>,
    },
    PostMessage {
        text: String,
        reply: oneshot::Sender<RlResult<()>>,
    },
    UploadAttachment {
        bytes: Vec<u8>,
        filename: String,
        mime_type: String,
        reply: oneshot::Sender<RlResult<()>>,
    },
    ActiveRoom(oneshot::Sender<Option<Room>>),
    Shutdown,
}

/// Cloneable front end of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    fn command(&self, command: Command) -> RlResult<()> {
        self.commands.send(command).map_err(|_| RlError::SessionClosed)
    }

    /// Connect with `credential`. Returns immediately; progress is reported
    /// through the sink and [`watch_state`](Self::watch_state).
    pub fn connect(&self, credential: Credential) -> RlResult<()> {
        self.command(Command::Connect(credential))
    }

    /// Disconnect, forget the credential and cancel any pending reconnect.
    pub fn logout(&self) -> RlResult<()> {
        self.command(Command::Logout)
    }

    /// Focus `room`, load its history and subscribe to it.
    pub fn switch_room(&self, room: Room) -> RlResult<()> {
        self.command(Command::SwitchRoom(room))
    }

    /// Request live delivery for `(kind, target)`. Idempotent.
    pub fn subscribe(&self, kind: ChannelKind, target: impl Into<String>) -> RlResult<()> {
        self.command(Command::Subscribe(kind, target.into()))
    }

    /// Call a server method and wait for its result.
    pub async fn call(&self, method: impl Into<String>, params: Vec<Value>) -> RlResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Call {
            method: method.into(),
            params,
            reply: tx,
        })?;
        let pending = rx.await.map_err(|_| RlError::SessionClosed)?;
        pending.wait().await
    }

    /// Post `text` to the focused room.
    ///
    /// Resolves once the post is handed to the outbound sender; delivery
    /// failures are reported through [`UiSink::on_send_failed`].
    pub async fn post_message(&self, text: impl Into<String>) -> RlResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::PostMessage {
            text: text.into(),
            reply: tx,
        })?;
        rx.await.map_err(|_| RlError::SessionClosed)?
    }

    /// Upload a file to the focused room. Same delivery semantics as
    /// [`post_message`](Self::post_message).
    pub async fn upload_attachment(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> RlResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::UploadAttachment {
            bytes,
            filename: filename.into(),
            mime_type: mime_type.into(),
            reply: tx,
        })?;
        rx.await.map_err(|_| RlError::SessionClosed)?
    }

    /// Currently focused room.
    pub async fn active_room(&self) -> RlResult<Option<Room>> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::ActiveRoom(tx))?;
        rx.await.map_err(|_| RlError::SessionClosed)
    }

    /// Latest protocol state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for protocol state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target`, or `timeout` elapses.
    pub async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> RlResult<()> {
        let mut rx = self.state.clone();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == target))
            .await
            .map_err(|_| RlError::Timeout(format!("session did not become {target}")))?
            .map_err(|_| RlError::SessionClosed)?;
        Ok(())
    }

    /// Stop the session task. The connection is closed.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Whether the session task is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Entry point for starting a session.
pub struct Session;

impl Session {
    /// Spawn the session task on the current tokio runtime.
    pub fn spawn(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        history: Arc<dyn HistoryProvider>,
        outbound: Arc<dyn OutboundSender>,
        sink: Arc<dyn UiSink>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let connect_timeout = options.connect_timeout;
        let runtime = Runtime {
            engine: SessionEngine::new(options, Arc::clone(&sink)),
            connector,
            history,
            outbound,
            sink,
            connection: None,
            opening: None,
            connect_timeout,
            signal_tx,
            history_tx,
            opened_tx,
            state_tx,
        };
        tokio::spawn(runtime.run(command_rx, signal_rx, history_rx, opened_rx));

        SessionHandle {
            commands: command_tx,
            state: state_rx,
        }
    }
}

type HistoryResult = (String, RlResult<Vec<ChatMessage>>);
type OpenResult = (ConnectionId, RlResult<Connection>);

/// A connection attempt still in flight.
struct Opening {
    id: ConnectionId,
    task: JoinHandle<()>,
    /// Encoded frames waiting for the handle.
    queued: Vec<String>,
}

struct Runtime {
    engine: SessionEngine,
    connector: Arc<dyn Connector>,
    history: Arc<dyn HistoryProvider>,
    outbound: Arc<dyn OutboundSender>,
    sink: Arc<dyn UiSink>,
    connection: Option<Connection>,
    opening: Option<Opening>,
    connect_timeout: Duration,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    history_tx: mpsc::UnboundedSender<HistoryResult>,
    opened_tx: mpsc::UnboundedSender<OpenResult>,
    state_tx: watch::Sender<SessionState>,
}

impl Runtime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<TransportSignal>,
        mut histories: mpsc::UnboundedReceiver<HistoryResult>,
        mut opened: mpsc::UnboundedReceiver<OpenResult>,
    ) {
        debug!("session task started");
        loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(signal) = signals.recv() => self.engine.handle(signal),
                Some((connection, result)) = opened.recv() => self.on_opened(connection, result),
                Some((room_id, result)) = histories.recv() => {
                    self.engine.complete_room_switch(&room_id, result);
                }
                _ = sleep_until(deadline) => self.engine.poll_timers(Instant::now()),
            }
            self.apply_effects();
            self.publish_state();
        }

        if self.engine.credential().is_some() || self.connection.is_some() || self.opening.is_some() {
            self.engine.logout();
            self.apply_effects();
            self.publish_state();
        }
        self.abandon_opening();
        info!("session task stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(credential) => self.engine.connect(credential),
            Command::Logout => self.engine.logout(),
            Command::SwitchRoom(room) => self.engine.focus_room(room),
            Command::Subscribe(kind, target) => self.engine.subscribe(kind, &target),
            Command::Call {
                method,
                params,
                reply,
            } => {
                let pending = self.engine.call(&method, params);
                let _ = reply.send(pending);
            }
            Command::PostMessage { text, reply } => {
                let result = self.active_room_id().map(|room_id| {
                    let outbound = Arc::clone(&self.outbound);
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        if let Err(e) = outbound.post_message(&room_id, &text).await {
                            warn!("posting to room {room_id} failed: {e}");
                            sink.on_send_failed(&room_id, &e.to_string());
                        }
                    });
                });
                let _ = reply.send(result);
            }
            Command::UploadAttachment {
                bytes,
                filename,
                mime_type,
                reply,
            } => {
                let result = self.active_room_id().map(|room_id| {
                    let outbound = Arc::clone(&self.outbound);
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        let size = bytes.len();
                        match outbound
                            .upload_attachment(&room_id, bytes, &filename, &mime_type)
                            .await
                        {
                            Ok(()) => debug!("uploaded {filename} ({size} bytes) to room {room_id}"),
                            Err(e) => {
                                warn!("uploading {filename} to room {room_id} failed: {e}");
                                sink.on_send_failed(&room_id, &e.to_string());
                            }
                        }
                    });
                });
                let _ = reply.send(result);
            }
            Command::ActiveRoom(reply) => {
                let _ = reply.send(self.engine.active_room().cloned());
            }
            Command::Shutdown => {}
        }
    }

    fn active_room_id(&self) -> RlResult<String> {
        self.engine
            .active_room()
            .map(|r| r.id.clone())
            .ok_or(RlError::NoActiveRoom)
    }

    /// A connection attempt finished. Only the attempt the engine still
    /// waits for is kept; anything else is dropped, which closes it.
    fn on_opened(&mut self, connection: ConnectionId, result: RlResult<Connection>) {
        let queued = match self.opening.take() {
            Some(opening) if opening.id == connection => opening.queued,
            other => {
                self.opening = other;
                Vec::new()
            }
        };
        match result {
            Ok(live) if self.engine.connection() == Some(connection) => {
                for text in queued {
                    live.send(text);
                }
                self.connection = Some(live);
            }
            Ok(_) => debug!("{connection}: opened after being abandoned, closing"),
            Err(e) => self.engine.connect_failed(connection, &e),
        }
    }

    fn abandon_opening(&mut self) {
        if let Some(opening) = self.opening.take() {
            debug!("{}: connection attempt abandoned", opening.id);
            opening.task.abort();
        }
    }

    fn apply_effects(&mut self) {
        while let Some(effect) = self.engine.next_effect() {
            match effect {
                Effect::Open { connection, url } => {
                    // Drop whatever was left of the previous connection first.
                    self.connection = None;
                    self.abandon_opening();
                    let connector = Arc::clone(&self.connector);
                    let signals = self.signal_tx.clone();
                    let results = self.opened_tx.clone();
                    let timeout = self.connect_timeout;
                    let task = tokio::spawn(async move {
                        let opened = tokio::time::timeout(timeout, connector.open(&url, connection, signals))
                            .await
                            .unwrap_or_else(|_| {
                                Err(RlError::Connect(format!("timed out connecting to {url}")))
                            });
                        let _ = results.send((connection, opened));
                    });
                    self.opening = Some(Opening {
                        id: connection,
                        task,
                        queued: Vec::new(),
                    });
                }
                Effect::Send { connection, frame } => {
                    let text = match frame.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("{connection}: could not encode {} frame: {e}", frame.kind());
                            continue;
                        }
                    };
                    match (&self.connection, &mut self.opening) {
                        (Some(live), _) if live.id() == connection => {
                            trace!("{connection} -> {text}");
                            live.send(text);
                        }
                        (_, Some(opening)) if opening.id == connection => {
                            trace!("{connection} (opening) -> {text}");
                            opening.queued.push(text);
                        }
                        _ => debug!("{connection}: {} frame dropped, connection not open", frame.kind()),
                    }
                }
                Effect::Close { connection } => {
                    if self.connection.as_ref().is_some_and(|c| c.id() == connection) {
                        self.connection = None;
                    }
                    if self.opening.as_ref().is_some_and(|o| o.id == connection) {
                        self.abandon_opening();
                    }
                }
                Effect::FetchHistory { room, limit } => {
                    let history = Arc::clone(&self.history);
                    let results = self.history_tx.clone();
                    tokio::spawn(async move {
                        let result = history.fetch_history(&room.id, room.kind, limit).await;
                        let _ = results.send((room.id, result));
                    });
                }
            }
        }
    }

    fn publish_state(&self) {
        let state = self.engine.state();
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                debug!("session state: {current} -> {state}");
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
