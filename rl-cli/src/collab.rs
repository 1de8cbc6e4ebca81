//! REST-backed collaborators for the realtime session.

use async_trait::async_trait;

use rl_api::ApiClient;
use rl_core::error::RlResult;
use rl_models::{ChatMessage, RoomKind};
use rl_realtime::{HistoryProvider, OutboundSender};

/// Serves history fetches and outbound sends through the REST client.
pub struct RestCollaborator {
    api: ApiClient,
}

impl RestCollaborator {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl HistoryProvider for RestCollaborator {
    async fn fetch_history(
        &self,
        room_id: &str,
        kind: RoomKind,
        limit: u32,
    ) -> RlResult<Vec<ChatMessage>> {
        self.api.room_history(room_id, kind, limit).await
    }
}

#[async_trait]
impl OutboundSender for RestCollaborator {
    async fn post_message(&self, room_id: &str, text: &str) -> RlResult<()> {
        self.api.post_message(room_id, text).await.map(|_| ())
    }

    async fn upload_attachment(
        &self,
        room_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> RlResult<()> {
        let description = rl_api::media::is_audio(mime_type).then_some("Voice message");
        self.api
            .upload_file(room_id, bytes, filename, mime_type, description)
            .await
    }
}
