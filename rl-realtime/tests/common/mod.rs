//! Shared test utilities for session integration tests.
//!
//! `MockConnector` stands in for the websocket: every opened connection is
//! handed to the test as a `MockLink`, which can push server frames into
//! the session and read the frames the session wrote.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use rl_core::error::{RlError, RlResult};
use rl_models::{ChatMessage, Credential, RoomKind};
use rl_realtime::{
    Connection, ConnectionId, ConnectionStatus, Connector, EventBroadcaster, HistoryProvider,
    OutboundSender, Session, SessionEvent, SessionHandle, SessionOptions, SessionState, TransportEvent,
    TransportSignal,
};

pub const WAIT: Duration = Duration::from_secs(10);

// ---- Transport ----

/// Server side of one mock connection.
pub struct MockLink {
    pub id: ConnectionId,
    pub url: String,
    signals: mpsc::UnboundedSender<TransportSignal>,
    outgoing: mpsc::UnboundedReceiver<String>,
}

impl MockLink {
    /// Push a server frame to the session.
    pub fn deliver(&self, frame: Value) {
        let _ = self
            .signals
            .send(TransportSignal::new(self.id, TransportEvent::Message(frame.to_string())));
    }

    /// Drop the connection from the server side.
    pub fn close(&self) {
        let _ = self.signals.send(TransportSignal::new(self.id, TransportEvent::Closed));
    }

    /// Next frame written by the session.
    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.outgoing.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("connection closed by the session");
        serde_json::from_str(&text).expect("client frame is not json")
    }

    /// Next frame, asserting its `msg` kind.
    pub async fn expect_frame(&mut self, msg: &str) -> Value {
        let frame = self.next_frame().await;
        assert_eq!(frame["msg"], msg, "unexpected frame {frame}");
        frame
    }

    /// Frames already written, without waiting.
    pub fn try_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.outgoing.try_recv() {
            frames.push(serde_json::from_str(&text).expect("client frame is not json"));
        }
        frames
    }

    /// Wait until the session released this connection.
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(WAIT, async {
            while self.outgoing.recv().await.is_some() {}
        })
        .await
        .expect("connection was not closed");
    }
}

pub struct MockConnector {
    links: mpsc::UnboundedSender<MockLink>,
    refuse: AtomicU32,
    stall: AtomicU32,
    opens: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            links: tx,
            refuse: AtomicU32::new(0),
            stall: AtomicU32::new(0),
            opens: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Refuse the next `count` open attempts.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Hold the next `count` open attempts for a minute before answering.
    pub fn stall_next(&self, count: u32) {
        self.stall.store(count, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        url: &str,
        connection: ConnectionId,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) -> RlResult<Connection> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let stalled = self
            .stall
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(RlError::Connect("connection refused".into()));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let _ = signals.send(TransportSignal::new(connection, TransportEvent::Open));
        let _ = self.links.send(MockLink {
            id: connection,
            url: url.to_string(),
            signals,
            outgoing: outgoing_rx,
        });
        Ok(Connection::new(connection, outgoing_tx))
    }
}

// ---- Collaborators ----

#[derive(Default)]
pub struct MockHistory {
    rooms: Mutex<HashMap<String, Vec<ChatMessage>>>,
    fail: AtomicBool,
    pub requests: Mutex<Vec<(String, RoomKind, u32)>>,
}

impl MockHistory {
    pub fn seed(&self, room_id: &str, messages: Vec<ChatMessage>) {
        self.rooms.lock().unwrap().insert(room_id.to_string(), messages);
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistoryProvider for MockHistory {
    async fn fetch_history(
        &self,
        room_id: &str,
        kind: RoomKind,
        limit: u32,
    ) -> RlResult<Vec<ChatMessage>> {
        self.requests
            .lock()
            .unwrap()
            .push((room_id.to_string(), kind, limit));
        if self.fail.load(Ordering::SeqCst) {
            return Err(RlError::Http("history unavailable".into()));
        }
        Ok(self.rooms.lock().unwrap().get(room_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingOutbound {
    pub posts: Mutex<Vec<(String, String)>>,
    pub uploads: Mutex<Vec<(String, String, String, usize)>>,
    fail: AtomicBool,
}

impl RecordingOutbound {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundSender for RecordingOutbound {
    async fn post_message(&self, room_id: &str, text: &str) -> RlResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RlError::ServerError {
                status: 400,
                message: "error-action-not-allowed".into(),
            });
        }
        self.posts
            .lock()
            .unwrap()
            .push((room_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn upload_attachment(
        &self,
        room_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> RlResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RlError::ServerError {
                status: 413,
                message: "file too large".into(),
            });
        }
        self.uploads.lock().unwrap().push((
            room_id.to_string(),
            filename.to_string(),
            mime_type.to_string(),
            bytes.len(),
        ));
        Ok(())
    }
}

// ---- Harness ----

pub struct Harness {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
    pub links: mpsc::UnboundedReceiver<MockLink>,
    pub connector: Arc<MockConnector>,
    pub history: Arc<MockHistory>,
    pub outbound: Arc<RecordingOutbound>,
}

pub fn test_options() -> SessionOptions {
    SessionOptions::new("ws://chat.test/websocket")
}

/// Start a session with default options.
pub fn start() -> Harness {
    start_with(test_options())
}

pub fn start_with(options: SessionOptions) -> Harness {
    let (connector, links) = MockConnector::new();
    let history = Arc::new(MockHistory::default());
    let outbound = Arc::new(RecordingOutbound::default());
    let broadcaster = EventBroadcaster::new(256);
    let events = broadcaster.subscribe();
    let handle = Session::spawn(
        options,
        connector.clone(),
        history.clone(),
        outbound.clone(),
        Arc::new(broadcaster),
    );
    Harness {
        handle,
        events,
        links,
        connector,
        history,
        outbound,
    }
}

impl Harness {
    /// Next connection opened by the session.
    pub async fn next_link(&mut self) -> MockLink {
        tokio::time::timeout(Duration::from_secs(120), self.links.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Connect with token `T` and complete handshake and login.
    pub async fn connect_and_authenticate(&mut self) -> MockLink {
        self.handle
            .connect(Credential::new("u1", "T"))
            .expect("session running");
        let mut link = self.next_link().await;
        authenticate(&mut link).await;
        self.handle
            .wait_for_state(SessionState::Authenticated, WAIT)
            .await
            .expect("session did not authenticate");
        link
    }

    /// Next event matching `pick`, skipping others.
    pub async fn next_event<T>(&mut self, mut pick: impl FnMut(SessionEvent) -> Option<T>) -> T {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if let Some(found) = pick(event) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for an event")
    }

    pub async fn next_message(&mut self) -> ChatMessage {
        self.next_event(|e| match e {
            SessionEvent::Message(m) => Some(m),
            _ => None,
        })
        .await
    }

    /// Wait for a status matching `pred`.
    pub async fn wait_status(&mut self, pred: impl Fn(&ConnectionStatus) -> bool) -> ConnectionStatus {
        self.next_event(|e| match e {
            SessionEvent::ConnectionStatus(s) if pred(&s) => Some(s),
            _ => None,
        })
        .await
    }

    pub async fn wait_subscription_ready(&mut self, room_id: &str) {
        let room_id = room_id.to_string();
        self.next_event(move |e| match e {
            SessionEvent::SubscriptionReady { room_id: r } if r == room_id => Some(()),
            _ => None,
        })
        .await
    }
}

/// Answer the handshake and the login of a fresh link.
pub async fn authenticate(link: &mut MockLink) {
    let connect = link.expect_frame("connect").await;
    assert_eq!(connect["version"], "1");
    link.deliver(json!({"server_id": "0"}));
    link.deliver(json!({"msg": "connected", "session": "sess"}));

    let login = link.expect_frame("method").await;
    assert_eq!(login["method"], "login");
    assert_eq!(login["params"][0]["resume"], "T");
    link.deliver(json!({
        "msg": "result",
        "id": login["id"],
        "result": {"id": "u1", "token": "T", "type": "resume"}
    }));
}

/// A `changed` frame carrying one room message.
pub fn changed_frame(id: &str, room_id: &str, text: &str) -> Value {
    json!({
        "msg": "changed",
        "collection": "stream-room-messages",
        "id": "id",
        "fields": {
            "eventName": room_id,
            "args": [{
                "_id": id,
                "rid": room_id,
                "msg": text,
                "ts": {"$date": 1_700_000_000_000i64},
                "u": {"_id": "u2", "username": "bob"}
            }]
        }
    })
}

pub fn message(id: &str, room_id: &str) -> ChatMessage {
    ChatMessage::from_server_map(&json!({"_id": id, "rid": room_id, "msg": id}))
        .expect("valid message")
}
