//! Room listing and history endpoints.

use tracing::debug;

use rl_core::error::{RlError, RlResult};
use rl_models::{ChannelSummary, ChatMessage, DirectRoomSummary, RoomKind};

use crate::client::ApiClient;
use crate::response::{ChannelsBody, CreatedRoomBody, DirectRoomsBody, MessagesBody};

impl ApiClient {
    /// Channels the user has joined.
    pub async fn joined_channels(&self) -> RlResult<Vec<ChannelSummary>> {
        let body: ChannelsBody = self.get_json("/channels.list.joined").await?;
        Ok(body.channels)
    }

    /// Direct message rooms of the user.
    pub async fn direct_rooms(&self) -> RlResult<Vec<DirectRoomSummary>> {
        let body: DirectRoomsBody = self.get_json("/im.list").await?;
        Ok(body.ims)
    }

    /// Create the direct room with `username`, or return the existing one.
    /// Returns the room id.
    pub async fn create_direct_room(&self, username: &str) -> RlResult<String> {
        let body = serde_json::json!({ "username": username });
        let created: CreatedRoomBody = self.post_json("/im.create", &body).await?;
        let room = created
            .room
            .ok_or_else(|| RlError::Serialization("im.create returned no room".into()))?;
        debug!("direct room with {username}: {}", room.id);
        Ok(room.id)
    }

    /// The latest `count` messages of a room, oldest first.
    pub async fn room_history(
        &self,
        room_id: &str,
        kind: RoomKind,
        count: u32,
    ) -> RlResult<Vec<ChatMessage>> {
        let body: MessagesBody = self.get_json(&history_path(room_id, kind, count)).await?;
        let mut messages = body.messages;
        messages.reverse();
        debug!("loaded {} messages for room {room_id}", messages.len());
        Ok(messages)
    }
}

fn history_path(room_id: &str, kind: RoomKind, count: u32) -> String {
    let endpoint = match kind {
        RoomKind::Channel => "channels.messages",
        RoomKind::DirectMessage => "im.messages",
    };
    format!("/{endpoint}?roomId={room_id}&count={count}")
}
