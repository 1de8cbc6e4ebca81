//! User entity model.

use serde::{Deserialize, Serialize};

/// A user as listed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Presence: "online", "away", "busy" or "offline".
    #[serde(default)]
    pub status: Option<String>,
}

impl User {
    /// Whether the user is currently online.
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some("online")
    }
}
