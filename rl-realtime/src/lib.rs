//! RocketLink Realtime - the messaging session core.
//!
//! This crate keeps a persistent DDP-style websocket session to the chat
//! server:
//! - Versioned handshake and resume-token authentication
//! - Liveness probes answered immediately
//! - Idempotent per-room subscriptions, re-issued after every reconnect
//! - Deduplicated message delivery to the focused room
//! - Request/response correlation with timeouts
//! - Reconnection with a configurable backoff policy
//!
//! The protocol logic lives in the I/O-free [`SessionEngine`]; [`Session`]
//! runs it on a tokio task behind a [`SessionHandle`].

pub mod collaborators;
pub mod correlation;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod frames;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export key types
pub use collaborators::{HistoryProvider, OutboundSender};
pub use correlation::{CorrelationTable, PendingReply};
pub use dispatcher::{BackgroundPolicy, Delivery, MessageDispatcher, SeenMessages};
pub use engine::{Effect, SessionEngine, SessionOptions, SessionState};
pub use events::{ConnectionStatus, EventBroadcaster, SessionEvent, UiSink};
pub use frames::{ClientFrame, ServerFrame};
pub use reconnect::ReconnectConfig;
pub use registry::{ChannelKind, SubscriptionKey, SubscriptionRegistry, SubscriptionStatus};
pub use session::{Session, SessionHandle};
pub use transport::{Connection, ConnectionId, Connector, TransportEvent, TransportSignal, WsConnector};
