//! Session events and the UI sink.
//!
//! The session reports to its consumer through [`UiSink`]. The
//! [`EventBroadcaster`] implementation fans events out over a tokio
//! broadcast channel so several consumers can listen independently.

use tokio::sync::broadcast;
use tracing::debug;

use rl_models::ChatMessage;

/// Connection status as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Opening the transport.
    Connecting,
    /// Handshake accepted, authenticating.
    Connected,
    /// Ready for subscriptions and calls.
    Authenticated,
    /// Connection gone; nothing scheduled.
    Disconnected,
    /// Connection gone; next attempt scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Credential rejected. The user must log in again.
    AuthFailed(String),
    /// Gave up. No further attempts.
    Failed(String),
}

impl ConnectionStatus {
    /// Whether the status is terminal until the user acts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed(_) | Self::Failed(_))
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting { attempt, delay_ms } => {
                write!(f, "reconnecting (attempt {attempt} in {:.1}s)", *delay_ms as f64 / 1000.0)
            }
            Self::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Receiver of everything the session reports.
pub trait UiSink: Send + Sync {
    fn on_message(&self, message: &ChatMessage);
    fn on_connection_status(&self, status: &ConnectionStatus);
    fn on_subscription_ready(&self, room_id: &str);
    /// An outbound post or upload failed. Not retried.
    fn on_send_failed(&self, _room_id: &str, _reason: &str) {}
}

/// Event form of the [`UiSink`] callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(ChatMessage),
    ConnectionStatus(ConnectionStatus),
    SubscriptionReady { room_id: String },
    SendFailed { room_id: String, reason: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ConnectionStatus(_) => "connection-status",
            Self::SubscriptionReady { .. } => "subscription-ready",
            Self::SendFailed { .. } => "send-failed",
        }
    }
}

/// Broadcast-based sink.
///
/// Slow consumers that fall behind receive `RecvError::Lagged` and miss
/// events; they never block the session.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(count) => debug!("published {kind} to {count} subscriber(s)"),
            Err(_) => debug!("no subscribers for {kind}"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl UiSink for EventBroadcaster {
    fn on_message(&self, message: &ChatMessage) {
        self.publish(SessionEvent::Message(message.clone()));
    }

    fn on_connection_status(&self, status: &ConnectionStatus) {
        self.publish(SessionEvent::ConnectionStatus(status.clone()));
    }

    fn on_subscription_ready(&self, room_id: &str) {
        self.publish(SessionEvent::SubscriptionReady {
            room_id: room_id.to_string(),
        });
    }

    fn on_send_failed(&self, room_id: &str, reason: &str) {
        self.publish(SessionEvent::SendFailed {
            room_id: room_id.to_string(),
            reason: reason.to_string(),
        });
    }
}
