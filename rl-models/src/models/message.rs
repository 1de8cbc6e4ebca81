//! Chat message entity model.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use rl_core::error::{RlError, RlResult};

/// A single chat message as pushed by the server or returned by history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identity used for deduplication.
    #[serde(rename = "_id")]
    pub id: String,
    /// Room the message belongs to.
    #[serde(rename = "rid")]
    pub room_id: String,
    /// Message text (may be empty for attachment-only messages).
    #[serde(rename = "msg", default)]
    pub text: String,
    /// Creation time.
    #[serde(rename = "ts", default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Author.
    #[serde(rename = "u", default)]
    pub author: Option<MessageAuthor>,
    /// Files, images and voice notes attached to the message.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Author reference embedded in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAuthor {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A file attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_link: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// How an attachment should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Audio,
    Image,
    File,
}

impl Attachment {
    /// Classify the attachment. Audio wins over image, image over a plain link.
    pub fn kind(&self) -> Option<AttachmentKind> {
        if self.audio_url.is_some() {
            Some(AttachmentKind::Audio)
        } else if self.image_url.is_some() {
            Some(AttachmentKind::Image)
        } else if self.title_link.is_some() {
            Some(AttachmentKind::File)
        } else {
            None
        }
    }

    /// Server-relative path of the attachment payload.
    pub fn path(&self) -> Option<&str> {
        self.audio_url
            .as_deref()
            .or(self.image_url.as_deref())
            .or(self.title_link.as_deref())
    }

    /// Absolute URL of the payload on the given server origin.
    pub fn url(&self, origin: &str) -> Option<String> {
        self.path().map(|p| {
            if p.starts_with("http://") || p.starts_with("https://") {
                p.to_string()
            } else {
                format!("{}{}", origin.trim_end_matches('/'), p)
            }
        })
    }

    /// Title shown for the attachment.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("File")
    }
}

impl ChatMessage {
    /// Parse a message from a server JSON value.
    pub fn from_server_map(map: &serde_json::Value) -> RlResult<Self> {
        let message: ChatMessage = serde_json::from_value(map.clone())
            .map_err(|e| RlError::Protocol(format!("invalid chat message: {e}")))?;
        if message.id.is_empty() {
            return Err(RlError::Protocol("chat message without _id".into()));
        }
        Ok(message)
    }

    /// Username of the author, or "Unknown".
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| a.username.as_str())
            .filter(|u| !u.is_empty())
            .unwrap_or("Unknown")
    }

    /// Whether the message was written by `username`.
    pub fn is_from(&self, username: &str) -> bool {
        self.author.as_ref().is_some_and(|a| a.username == username)
    }

    /// Whether the message carries any attachment.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Accepts `{"$date": ms}` (realtime), an ISO-8601 string (REST) or bare millis.
/// Anything else becomes `None` rather than failing the message.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Date {
            #[serde(rename = "$date")]
            date: i64,
        },
        Iso(String),
        Millis(i64),
        FractionalMillis(f64),
        Other(serde_json::Value),
    }

    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Date { date }) | Some(RawTimestamp::Millis(date)) => {
            Utc.timestamp_millis_opt(date).single()
        }
        Some(RawTimestamp::Iso(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Some(RawTimestamp::FractionalMillis(ms)) if ms.is_finite() => {
            Utc.timestamp_millis_opt(ms as i64).single()
        }
        Some(RawTimestamp::FractionalMillis(_)) | Some(RawTimestamp::Other(_)) | None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_realtime_message() {
        let value = json!({
            "_id": "m1",
            "rid": "R1",
            "msg": "hi",
            "ts": {"$date": 1_700_000_000_000i64},
            "u": {"_id": "u1", "username": "alice", "name": "Alice"}
        });
        let msg = ChatMessage::from_server_map(&value).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.room_id, "R1");
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
        assert!(msg.is_from("alice"));
        assert!(!msg.is_from("bob"));
    }

    #[test]
    fn test_parse_rest_message_with_iso_timestamp() {
        let value = json!({
            "_id": "m2",
            "rid": "GENERAL",
            "msg": "",
            "ts": "2024-07-01T10:30:00.000Z",
            "attachments": [{"title": "voice.webm", "audio_url": "/file-upload/abc/voice.webm"}]
        });
        let msg = ChatMessage::from_server_map(&value).unwrap();
        assert!(msg.timestamp.is_some());
        assert_eq!(msg.author_name(), "Unknown");
        assert!(msg.has_attachments());
        assert_eq!(msg.attachments[0].kind(), Some(AttachmentKind::Audio));
        assert_eq!(
            msg.attachments[0].url("http://localhost:3001/").unwrap(),
            "http://localhost:3001/file-upload/abc/voice.webm"
        );
    }

    #[test]
    fn test_missing_id_is_protocol_error() {
        let err = ChatMessage::from_server_map(&json!({"rid": "R1", "msg": "x"})).unwrap_err();
        assert!(matches!(err, RlError::Protocol(_)));

        let err = ChatMessage::from_server_map(&json!({"_id": "", "rid": "R1"})).unwrap_err();
        assert!(matches!(err, RlError::Protocol(_)));
    }

    #[test]
    fn test_unparsable_timestamp_is_none() {
        let value = json!({"_id": "m3", "rid": "R1", "ts": "yesterday"});
        let msg = ChatMessage::from_server_map(&value).unwrap();
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_unexpected_timestamp_shape_keeps_message() {
        for ts in [
            json!({"$date": "2024-07-01"}),
            json!({"$date": 1.7e12}),
            json!({"when": 1}),
            json!([1, 2]),
            json!(true),
        ] {
            let value = json!({"_id": "m4", "rid": "R1", "msg": "still here", "ts": ts});
            let msg = ChatMessage::from_server_map(&value).unwrap();
            assert_eq!(msg.text, "still here");
            assert!(msg.timestamp.is_none(), "ts {ts} should not parse");
        }
    }

    #[test]
    fn test_fractional_millis_timestamp() {
        let value = json!({"_id": "m5", "rid": "R1", "ts": 1_700_000_000_000.0});
        let msg = ChatMessage::from_server_map(&value).unwrap();
        assert_eq!(msg.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_attachment_kind_precedence() {
        let image = Attachment {
            image_url: Some("/img.png".into()),
            title_link: Some("/img.png".into()),
            ..Default::default()
        };
        assert_eq!(image.kind(), Some(AttachmentKind::Image));

        let file = Attachment {
            title_link: Some("/doc.pdf".into()),
            ..Default::default()
        };
        assert_eq!(file.kind(), Some(AttachmentKind::File));
        assert_eq!(file.display_title(), "File");
        assert_eq!(Attachment::default().kind(), None);
    }
}
