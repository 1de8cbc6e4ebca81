//! Server response types.
//!
//! REST responses from the chat server come in two shapes. Most endpoints
//! answer with a `success` flag next to the payload fields:
//! ```json
//! { "success": true, "channels": [ ... ], "count": 3, "total": 3 }
//! ```
//! while `/login` wraps its payload in a status envelope:
//! ```json
//! { "status": "success", "data": { "authToken": "...", "userId": "..." } }
//! ```
//! [`ServerResponse`] accepts both.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rl_core::error::{RlError, RlResult};
use rl_models::{ChannelSummary, ChatMessage, DirectRoomSummary, User};

/// Standard server response envelope around a typed body.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse<T> {
    /// Set by most endpoints.
    #[serde(default)]
    pub success: Option<bool>,
    /// Set by `/login` ("success" or "error").
    #[serde(default)]
    pub status: Option<String>,
    /// Error identifier or text. Some endpoints send a number here.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Endpoint specific payload fields.
    #[serde(flatten)]
    pub body: T,
}

impl<T> ServerResponse<T> {
    /// Whether the response indicates success.
    pub fn is_success(&self) -> bool {
        match (self.success, self.status.as_deref()) {
            (Some(success), _) => success,
            (None, Some(status)) => status == "success",
            (None, None) => self.error.is_none(),
        }
    }

    /// Get the error message if this is an error response.
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        Some(match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "request failed".to_string(),
        })
    }

    /// Unwrap the body, turning an unsuccessful envelope into an error.
    pub fn into_result(self, status: u16) -> RlResult<T> {
        match self.error_message() {
            None => Ok(self.body),
            Some(message) => Err(RlError::ServerError { status, message }),
        }
    }
}

/// Parse a response body into a `ServerResponse<T>`.
pub fn parse_envelope<T: DeserializeOwned>(text: &str) -> RlResult<ServerResponse<T>> {
    serde_json::from_str(text)
        .map_err(|e| RlError::Serialization(format!("failed to parse response: {e}")))
}

/// Payload of a successful `/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(rename = "authToken")]
    pub auth_token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub data: Option<LoginData>,
}

/// Pagination fields shared by list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationMetadata {
    /// Number of items in this page.
    #[serde(default)]
    pub count: Option<i64>,
    /// Current offset.
    #[serde(default)]
    pub offset: Option<i64>,
    /// Total number of results.
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersBody {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(flatten)]
    pub page: PaginationMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsBody {
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
    #[serde(flatten)]
    pub page: PaginationMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectRoomsBody {
    #[serde(default)]
    pub ims: Vec<DirectRoomSummary>,
    #[serde(flatten)]
    pub page: PaginationMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesBody {
    /// Newest first, as the server sends them.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub page: PaginationMetadata,
}

/// Room reference returned by `im.create`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRoom {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub usernames: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedRoomBody {
    #[serde(default)]
    pub room: Option<CreatedRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostedMessageBody {
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

/// Body of endpoints whose payload we do not read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}
