//! Posting messages and uploading files.

use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use rl_core::error::{RlError, RlResult};
use rl_models::ChatMessage;

use crate::client::ApiClient;
use crate::response::{Empty, PostedMessageBody};

impl ApiClient {
    /// Post a text message to a room. Returns the stored message when the
    /// server echoes it.
    pub async fn post_message(&self, room_id: &str, text: &str) -> RlResult<Option<ChatMessage>> {
        let body = serde_json::json!({ "roomId": room_id, "text": text });
        let posted: PostedMessageBody = self.post_json("/chat.postMessage", &body).await?;
        debug!("message posted to room {room_id}");
        Ok(posted.message)
    }

    /// Upload a file to a room as multipart form data.
    pub async fn upload_file(
        &self,
        room_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
        description: Option<&str>,
    ) -> RlResult<()> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| RlError::Http(format!("invalid mime type {mime_type}: {e}")))?;
        let mut form = Form::new().part("file", part);
        if let Some(description) = description {
            form = form.text("description", description.to_string());
        }

        let resp = self
            .post_multipart(&format!("/rooms.upload/{room_id}"), form)
            .await?;
        let _: Empty = Self::parse_response(resp).await?;
        info!("uploaded {filename} ({size} bytes, {mime_type}) to room {room_id}");
        Ok(())
    }
}
