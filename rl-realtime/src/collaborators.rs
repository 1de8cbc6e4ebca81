//! Operations the session consumes from the outside world.
//!
//! The session never talks REST itself. History and outbound sends go
//! through these traits; the CLI backs them with the REST client.

use async_trait::async_trait;

use rl_core::error::RlResult;
use rl_models::{ChatMessage, RoomKind};

/// Source of room history.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Up to `limit` most recent messages of a room, oldest first.
    async fn fetch_history(
        &self,
        room_id: &str,
        kind: RoomKind,
        limit: u32,
    ) -> RlResult<Vec<ChatMessage>>;
}

/// Posts text and files to rooms.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn post_message(&self, room_id: &str, text: &str) -> RlResult<()>;

    async fn upload_attachment(
        &self,
        room_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> RlResult<()>;
}
