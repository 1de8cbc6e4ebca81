//! Room entity models.

use serde::{Deserialize, Serialize};

/// The two kinds of room a user can focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// A public or private channel (`#general`).
    Channel,
    /// A one-to-one direct message room.
    DirectMessage,
}

impl RoomKind {
    /// Parse a room kind from its CLI/server spelling.
    ///
    /// Accepts the server's single-letter room types (`c`, `p`, `d`) too.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "channel" | "c" | "p" | "group" => Some(Self::Channel),
            "dm" | "d" | "direct" | "direct_message" => Some(Self::DirectMessage),
            _ => None,
        }
    }

    /// Short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::DirectMessage => "dm",
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room the user can focus: id, kind and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub kind: RoomKind,
    pub name: String,
}

impl Room {
    /// A channel room.
    pub fn channel(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RoomKind::Channel,
            name: name.into(),
        }
    }

    /// A direct message room with `peer`.
    pub fn direct(id: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RoomKind::DirectMessage,
            name: peer.into(),
        }
    }

    /// Title shown in headers: `#general` or `DM: alice`.
    pub fn title(&self) -> String {
        match self.kind {
            RoomKind::Channel => format!("#{}", self.name.trim_start_matches('#')),
            RoomKind::DirectMessage => format!("DM: {}", self.name),
        }
    }
}

/// A joined channel as listed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "msgs", default)]
    pub message_count: u64,
}

impl ChannelSummary {
    /// Convert to a focusable room.
    pub fn to_room(&self) -> Room {
        Room::channel(self.id.clone(), self.name.clone())
    }
}

/// A direct message room as listed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectRoomSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub usernames: Vec<String>,
}

impl DirectRoomSummary {
    /// The participant that is not `own_username`.
    ///
    /// Falls back to the first participant for self-DMs.
    pub fn peer_name(&self, own_username: &str) -> &str {
        self.usernames
            .iter()
            .find(|u| u.as_str() != own_username)
            .or_else(|| self.usernames.first())
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    /// Convert to a focusable room from the point of view of `own_username`.
    pub fn to_room(&self, own_username: &str) -> Room {
        Room::direct(self.id.clone(), self.peer_name(own_username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_kind_parse() {
        assert_eq!(RoomKind::parse("channel"), Some(RoomKind::Channel));
        assert_eq!(RoomKind::parse("c"), Some(RoomKind::Channel));
        assert_eq!(RoomKind::parse("dm"), Some(RoomKind::DirectMessage));
        assert_eq!(RoomKind::parse("d"), Some(RoomKind::DirectMessage));
        assert_eq!(RoomKind::parse("livechat"), None);
    }

    #[test]
    fn test_room_title() {
        assert_eq!(Room::channel("GENERAL", "general").title(), "#general");
        assert_eq!(Room::channel("GENERAL", "#general").title(), "#general");
        assert_eq!(Room::direct("abc", "bob").title(), "DM: bob");
    }

    #[test]
    fn test_direct_room_peer_name() {
        let dm: DirectRoomSummary =
            serde_json::from_value(serde_json::json!({"_id": "d1", "usernames": ["alice", "bob"]}))
                .unwrap();
        assert_eq!(dm.peer_name("alice"), "bob");
        assert_eq!(dm.peer_name("bob"), "alice");

        let self_dm = DirectRoomSummary {
            id: "d2".into(),
            usernames: vec!["alice".into()],
        };
        assert_eq!(self_dm.peer_name("alice"), "alice");
        assert_eq!(self_dm.to_room("alice").kind, RoomKind::DirectMessage);
    }
}
