//! Session protocol engine.
//!
//! A synchronous state machine that owns every piece of session state:
//! credential, request-id counter, subscription registry, correlation
//! table, dispatcher and the focused room. It never performs I/O. Inputs
//! are transport signals, user intents and timer polls; outputs are
//! [`Effect`]s queued for the runtime plus calls into the [`UiSink`].
//!
//! ```text
//! Disconnected -> Connecting -> HandshakeSent -> Authenticating -> Authenticated
//!       ^______________________________________________________________|
//!                          transport close / error
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use rl_core::config::{AppConfig, BackgroundMessages};
use rl_core::constants::{self, ddp};
use rl_core::error::{RlError, RlResult};
use rl_models::{ChatMessage, Credential, Room};

use crate::correlation::{deadline_after, CorrelationTable, PendingReply};
use crate::dispatcher::{BackgroundPolicy, MessageDispatcher};
use crate::events::{ConnectionStatus, UiSink};
use crate::frames::{changed_payload, ClientFrame, RemoteError, ServerFrame};
use crate::reconnect::ReconnectConfig;
use crate::registry::{ChannelKind, SubscriptionKey, SubscriptionRegistry};
use crate::transport::{ConnectionId, TransportEvent, TransportSignal};

/// Protocol state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    HandshakeSent,
    Authenticating,
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::HandshakeSent => write!(f, "handshake sent"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Websocket endpoint.
    pub url: String,
    /// Window for correlated requests, authentication included.
    pub request_timeout: Duration,
    /// Bound on opening the transport.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub seen_capacity: usize,
    pub background: BackgroundPolicy,
    /// Messages fetched per room switch.
    pub history_limit: u32,
}

impl SessionOptions {
    /// Defaults for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Duration::from_millis(constants::DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(constants::DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectConfig::default(),
            seen_capacity: constants::MAX_SEEN_MESSAGE_HISTORY,
            background: BackgroundPolicy::Discard,
            history_limit: constants::DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Build from the `[server]` and `[session]` config sections.
    pub fn from_config(config: &AppConfig) -> RlResult<Self> {
        let session = &config.session;
        let background = match session.background_messages {
            BackgroundMessages::Discard => BackgroundPolicy::Discard,
            BackgroundMessages::Buffer => BackgroundPolicy::Buffer {
                per_room_limit: session.buffer_limit,
            },
        };
        Ok(Self {
            url: config.server.websocket_url()?,
            request_timeout: session.request_timeout(),
            connect_timeout: session.connect_timeout(),
            reconnect: ReconnectConfig::from(session),
            seen_capacity: session.seen_capacity,
            background,
            history_limit: session.history_limit,
        })
    }
}

/// Work the engine asks the runtime to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a transport under this connection id.
    Open { connection: ConnectionId, url: String },
    /// Write a frame on the connection, if it is still the live one.
    Send { connection: ConnectionId, frame: ClientFrame },
    /// Release the connection.
    Close { connection: ConnectionId },
    /// Load history for a newly focused room and report back through
    /// [`SessionEngine::complete_room_switch`].
    FetchHistory { room: Room, limit: u32 },
}

/// Outstanding authentication request.
struct AuthAttempt {
    request_id: String,
    reply: PendingReply,
}

pub struct SessionEngine {
    options: SessionOptions,
    sink: Arc<dyn UiSink>,
    state: SessionState,
    credential: Option<Credential>,
    next_request_id: u64,
    next_connection_id: u64,
    connection: Option<ConnectionId>,
    registry: SubscriptionRegistry,
    pending: CorrelationTable,
    dispatcher: MessageDispatcher,
    active_room: Option<Room>,
    /// Subscriptions requested before authentication completed.
    deferred: Vec<SubscriptionKey>,
    auth: Option<AuthAttempt>,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,
    effects: VecDeque<Effect>,
}

impl SessionEngine {
    pub fn new(options: SessionOptions, sink: Arc<dyn UiSink>) -> Self {
        let pending = CorrelationTable::new(options.request_timeout);
        let dispatcher = MessageDispatcher::new(options.seen_capacity, options.background);
        Self {
            options,
            sink,
            state: SessionState::Disconnected,
            credential: None,
            next_request_id: 1,
            next_connection_id: 1,
            connection: None,
            registry: SubscriptionRegistry::new(),
            pending,
            dispatcher,
            active_room: None,
            deferred: Vec::new(),
            auth: None,
            reconnect_at: None,
            reconnect_attempts: 0,
            effects: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn active_room(&self) -> Option<&Room> {
        self.active_room.as_ref()
    }

    /// Id of the live connection, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Whether a reconnect attempt is scheduled.
    pub fn reconnect_scheduled(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Next queued effect.
    pub fn next_effect(&mut self) -> Option<Effect> {
        self.effects.pop_front()
    }

    /// All queued effects.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.effects.drain(..).collect()
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.reconnect_at, self.pending.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // -- user intents --

    /// Start a session with `credential`.
    ///
    /// A live connection is replaced. Any scheduled reconnect is cancelled
    /// and the attempt counter starts over.
    pub fn connect(&mut self, credential: Credential) {
        if self.connection.is_some() {
            info!("connect requested while {}; replacing connection", self.state);
            self.teardown();
        }
        self.credential = Some(credential);
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.open();
    }

    /// End the session for good: no reconnect, all state cleared.
    pub fn logout(&mut self) {
        info!("logging out");
        self.credential = None;
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.deferred.clear();
        self.teardown();
        self.dispatcher.clear();
        self.active_room = None;
        self.sink.on_connection_status(&ConnectionStatus::Disconnected);
    }

    /// Request delivery for `(kind, target)`.
    ///
    /// Idempotent. Before authentication the request is held back and
    /// issued once the session is authenticated.
    pub fn subscribe(&mut self, kind: ChannelKind, target: &str) {
        let key = SubscriptionKey::new(kind, target);
        if self.state != SessionState::Authenticated {
            if !self.deferred.contains(&key) {
                debug!("subscription {key} deferred until authenticated");
                self.deferred.push(key);
            }
            return;
        }
        self.issue_subscription(key);
    }

    /// Focus `room`: the view is cleared and history is requested.
    pub fn focus_room(&mut self, room: Room) {
        info!("focusing {} ({})", room.title(), room.id);
        self.dispatcher.reset_seen();
        self.active_room = Some(room.clone());
        self.effects.push_back(Effect::FetchHistory {
            room,
            limit: self.options.history_limit,
        });
    }

    /// Finish a room switch with the fetched history.
    ///
    /// History goes through the dedup path, followed by anything buffered
    /// for the room. The room is then subscribed if the session is
    /// authenticated. Results for a room that lost focus meanwhile are
    /// ignored.
    pub fn complete_room_switch(&mut self, room_id: &str, history: RlResult<Vec<ChatMessage>>) {
        if self.active_room.as_ref().map(|r| r.id.as_str()) != Some(room_id) {
            debug!("history for room {room_id} arrived after focus moved on");
            return;
        }

        let messages = match history {
            Ok(messages) => messages,
            Err(e) => {
                warn!("history for room {room_id} unavailable: {e}");
                Vec::new()
            }
        };
        debug!("room {room_id}: {} history message(s)", messages.len());

        let buffered = self.dispatcher.take_buffered(room_id);
        for message in messages.into_iter().chain(buffered) {
            self.dispatcher.dispatch(message, Some(room_id), self.sink.as_ref());
        }

        if self.state == SessionState::Authenticated {
            self.issue_subscription(SubscriptionKey::room(room_id));
        }
    }

    /// Issue a method call and return the caller's side of it.
    ///
    /// Rejected with [`RlError::NotAuthenticated`] unless authenticated.
    pub fn call(&mut self, method: &str, params: Vec<Value>) -> PendingReply {
        if self.state != SessionState::Authenticated {
            debug!("call {method} rejected in state {}", self.state);
            return PendingReply::rejected(RlError::NotAuthenticated);
        }
        let id = self.allocate_request_id();
        let reply = self.pending.register(id.clone(), method);
        self.send(ClientFrame::Method {
            method: method.to_string(),
            id,
            params,
        });
        reply
    }

    // -- transport input --

    /// Feed one transport signal. Signals from discarded connections are
    /// ignored.
    pub fn handle(&mut self, signal: TransportSignal) {
        if self.connection != Some(signal.connection) {
            debug!("stale signal from {} ignored: {:?}", signal.connection, signal.event);
            return;
        }
        let connection = signal.connection;

        match signal.event {
            TransportEvent::Open => {
                if self.state != SessionState::Connecting {
                    warn!("{connection}: unexpected open in state {}", self.state);
                    return;
                }
                debug!("{connection}: open, sending handshake");
                self.state = SessionState::HandshakeSent;
                self.send(ClientFrame::handshake());
            }
            TransportEvent::Message(text) => match ServerFrame::decode(&text) {
                Ok(Some(frame)) => self.on_frame(connection, frame),
                Ok(None) => debug!("{connection}: frame without msg ignored"),
                Err(e) => warn!("{connection}: dropping frame: {e}"),
            },
            TransportEvent::Error(reason) => {
                self.connection_lost(&format!("transport error: {reason}"));
            }
            TransportEvent::Closed => {
                self.connection_lost("closed by peer");
            }
        }
    }

    /// The runtime could not open `connection`.
    pub fn connect_failed(&mut self, connection: ConnectionId, err: &RlError) {
        if self.connection != Some(connection) {
            return;
        }
        warn!("{connection}: {err}");
        self.connection = None;
        self.connection_lost("connect failed");
    }

    /// Run due timers: reconnect and request timeouts.
    pub fn poll_timers(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.credential.is_some() && self.connection.is_none() {
                info!("reconnect attempt {}", self.reconnect_attempts);
                self.open();
            }
        }

        let expired = self.pending.expire(now);
        let auth_expired = self
            .auth
            .as_ref()
            .is_some_and(|a| expired.contains(&a.request_id));
        if auth_expired {
            if let Some(mut attempt) = self.auth.take() {
                let outcome = attempt.reply.try_take().unwrap_or(Err(RlError::ConnectionLost));
                self.on_auth_result(outcome);
            }
        }
    }

    // -- internals --

    fn on_frame(&mut self, connection: ConnectionId, frame: ServerFrame) {
        match frame {
            ServerFrame::Connected { session } => {
                if self.state != SessionState::HandshakeSent {
                    warn!("{connection}: connected frame in state {}", self.state);
                    return;
                }
                info!("{connection}: handshake accepted (session {})", session.as_deref().unwrap_or("-"));
                self.state = SessionState::Authenticating;
                self.sink.on_connection_status(&ConnectionStatus::Connected);
                self.authenticate();
            }
            ServerFrame::Failed { version } => {
                let reason = format!(
                    "server rejected protocol version {} (wants {})",
                    ddp::VERSION,
                    version.as_deref().unwrap_or("unknown")
                );
                error!("{connection}: {reason}");
                self.reconnect_at = None;
                self.teardown();
                self.sink.on_connection_status(&ConnectionStatus::Failed(reason));
            }
            ServerFrame::Ping { id } => self.send(ClientFrame::Pong { id }),
            ServerFrame::Pong { .. } => debug!("{connection}: pong"),
            ServerFrame::Result { id, result, error } => self.on_result(&id, result, error),
            ServerFrame::Ready { subs } => {
                for request_id in subs {
                    if let Some(key) = self.registry.confirm(&request_id) {
                        info!("subscription {key} ready (request {request_id})");
                        self.sink.on_subscription_ready(&key.target);
                    }
                }
            }
            ServerFrame::Nosub { id, error } => {
                let reason = error.map(|e| e.describe()).unwrap_or_else(|| "ended".into());
                match self.registry.remove_by_request(&id) {
                    Some(key) => warn!("subscription {key} (request {id}) removed by server: {reason}"),
                    None => debug!("nosub for unknown request {id}: {reason}"),
                }
            }
            ServerFrame::Changed { collection, fields, .. } => {
                self.on_changed(&collection, fields.as_ref());
            }
            ServerFrame::Added { .. } | ServerFrame::Removed { .. } | ServerFrame::Updated { .. } => {
                debug!("{connection}: ignoring frame");
            }
            ServerFrame::Error { reason } => {
                warn!(
                    "{connection}: server reported protocol error: {}",
                    reason.as_deref().unwrap_or("no reason")
                );
            }
        }
    }

    fn on_result(&mut self, request_id: &str, result: Option<Value>, error: Option<RemoteError>) {
        let operation = match self.pending.operation(request_id) {
            Some(op) => op.to_string(),
            None => {
                debug!("result for unknown request {request_id} ignored");
                return;
            }
        };
        let outcome = match error {
            Some(err) if operation == ddp::LOGIN_METHOD => Err(RlError::Auth(err.describe())),
            Some(err) => Err(RlError::MethodFailed {
                method: operation,
                reason: err.describe(),
            }),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        self.pending.resolve(request_id, outcome);

        let is_auth = self.auth.as_ref().is_some_and(|a| a.request_id == request_id);
        if is_auth {
            if let Some(mut attempt) = self.auth.take() {
                let outcome = attempt.reply.try_take().unwrap_or(Err(RlError::ConnectionLost));
                self.on_auth_result(outcome);
            }
        }
    }

    fn on_changed(&mut self, collection: &str, fields: Option<&Value>) {
        match ChannelKind::from_collection(collection) {
            Some(ChannelKind::RoomMessages) => {
                let Some(payload) = changed_payload(fields) else {
                    warn!("changed frame on {collection} without args dropped");
                    return;
                };
                match ChatMessage::from_server_map(payload) {
                    Ok(message) => {
                        let active = self.active_room.as_ref().map(|r| r.id.as_str());
                        let delivery = self.dispatcher.dispatch(message, active, self.sink.as_ref());
                        debug!("{collection}: {delivery:?}");
                    }
                    Err(e) => warn!("changed frame on {collection} dropped: {e}"),
                }
            }
            None => debug!("changed frame for unhandled collection {collection}"),
        }
    }

    fn authenticate(&mut self) {
        let Some(token) = self.credential.as_ref().map(|c| c.token.clone()) else {
            warn!("handshake accepted without a credential; closing");
            self.teardown();
            self.sink.on_connection_status(&ConnectionStatus::Disconnected);
            return;
        };
        let request_id = self.allocate_request_id();
        let reply = self.pending.register(request_id.clone(), ddp::LOGIN_METHOD);
        debug!("authenticating with request {request_id}");
        self.send(ClientFrame::login(request_id.clone(), &token));
        self.auth = Some(AuthAttempt { request_id, reply });
    }

    fn on_auth_result(&mut self, outcome: RlResult<Value>) {
        match outcome {
            Ok(value) => {
                if let Some(credential) = self.credential.as_mut() {
                    if let Some(token) = value.get("token").and_then(Value::as_str) {
                        if token != credential.token {
                            debug!("server issued a refreshed token");
                            credential.token = token.to_string();
                        }
                    }
                    if let Some(user_id) = value.get("id").and_then(Value::as_str) {
                        credential.user_id = user_id.to_string();
                    }
                }
                self.state = SessionState::Authenticated;
                self.reconnect_attempts = 0;
                info!("session authenticated");
                self.sink.on_connection_status(&ConnectionStatus::Authenticated);

                self.registry.clear();
                if let Some(room_id) = self.active_room.as_ref().map(|r| r.id.clone()) {
                    self.issue_subscription(SubscriptionKey::room(room_id));
                }
                for key in std::mem::take(&mut self.deferred) {
                    self.issue_subscription(key);
                }
            }
            Err(RlError::Timeout(reason)) => {
                warn!("authentication timed out: {reason}");
                self.connection_lost("authentication timed out");
            }
            Err(err) => {
                let reason = match err {
                    RlError::Auth(reason) => reason,
                    other => other.to_string(),
                };
                error!("authentication rejected: {reason}");
                self.credential = None;
                self.reconnect_at = None;
                self.deferred.clear();
                self.teardown();
                self.sink.on_connection_status(&ConnectionStatus::AuthFailed(reason));
            }
        }
    }

    fn issue_subscription(&mut self, key: SubscriptionKey) {
        if self.registry.contains(&key) {
            debug!("subscription {key} already requested");
            return;
        }
        let request_id = self.allocate_request_id();
        debug!("subscribing {key} with request {request_id}");
        let frame = ClientFrame::subscribe(request_id.clone(), key.kind.as_str(), &key.target);
        self.registry.insert(key, request_id);
        self.send(frame);
    }

    fn open(&mut self) {
        let connection = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        self.connection = Some(connection);
        self.state = SessionState::Connecting;
        info!("{connection}: connecting to {}", self.options.url);
        self.sink.on_connection_status(&ConnectionStatus::Connecting);
        self.effects.push_back(Effect::Open {
            connection,
            url: self.options.url.clone(),
        });
    }

    fn send(&mut self, frame: ClientFrame) {
        match self.connection {
            Some(connection) => self.effects.push_back(Effect::Send { connection, frame }),
            None => debug!("no connection; {} frame dropped", frame.kind()),
        }
    }

    fn allocate_request_id(&mut self) -> String {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id.to_string()
    }

    /// Drop the connection and everything derived from it.
    fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.effects.push_back(Effect::Close { connection });
        }
        self.state = SessionState::Disconnected;
        self.registry.clear();
        self.auth = None;
        let lost = self.pending.fail_all();
        if lost > 0 {
            debug!("{lost} pending request(s) failed with connection lost");
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        warn!("connection lost: {reason}");
        self.teardown();
        self.sink.on_connection_status(&ConnectionStatus::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.credential.is_none() {
            debug!("no credential held; not reconnecting");
            return;
        }
        let attempt = self.reconnect_attempts + 1;
        if !self.options.reconnect.allows(attempt) {
            let reason = format!("gave up after {} reconnect attempt(s)", self.reconnect_attempts);
            error!("{reason}");
            self.sink.on_connection_status(&ConnectionStatus::Failed(reason));
            return;
        }
        self.reconnect_attempts = attempt;
        let delay = self.options.reconnect.delay(attempt - 1);
        self.reconnect_at = Some(deadline_after(delay));
        info!("reconnect attempt {attempt} in {:.1}s", delay.as_secs_f64());
        self.sink.on_connection_status(&ConnectionStatus::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
    }
}
