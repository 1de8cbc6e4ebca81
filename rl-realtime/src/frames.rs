//! JSON frames exchanged over the realtime connection.
//!
//! Every frame is a small envelope tagged by its `msg` field. Outgoing
//! frames are built through the constructors on [`ClientFrame`]; incoming
//! text is classified with [`ServerFrame::decode`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rl_core::constants::ddp;
use rl_core::error::{RlError, RlResult};

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Versioned handshake.
    Connect { version: String, support: Vec<String> },
    /// Liveness acknowledgement, echoing the probe id if it had one.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Request/response call.
    Method {
        method: String,
        id: String,
        params: Vec<Value>,
    },
    /// Subscription request.
    Sub {
        id: String,
        name: String,
        params: Vec<Value>,
    },
}

impl ClientFrame {
    /// Handshake declaring the protocol versions we speak.
    pub fn handshake() -> Self {
        Self::Connect {
            version: ddp::VERSION.to_string(),
            support: ddp::SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Resume-token login.
    pub fn login(id: impl Into<String>, token: &str) -> Self {
        Self::Method {
            method: ddp::LOGIN_METHOD.to_string(),
            id: id.into(),
            params: vec![json!({ "resume": token })],
        }
    }

    /// Subscribe to `name` for `target`; the trailing flag disables replay.
    pub fn subscribe(id: impl Into<String>, name: &str, target: &str) -> Self {
        Self::Sub {
            id: id.into(),
            name: name.to_string(),
            params: vec![json!(target), json!(false)],
        }
    }

    /// Serialize to the wire.
    pub fn encode(&self) -> RlResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Frame kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Pong { .. } => "pong",
            Self::Method { .. } => "method",
            Self::Sub { .. } => "sub",
        }
    }
}

/// Error object carried by `result` and `nosub` frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RemoteError {
    /// Best human-readable description.
    pub fn describe(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| {
                self.error.as_ref().map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Handshake accepted.
    Connected {
        #[serde(default)]
        session: Option<String>,
    },
    /// Handshake rejected; `version` is the one the server proposes.
    Failed {
        #[serde(default)]
        version: Option<String>,
    },
    /// Liveness probe.
    Ping {
        #[serde(default)]
        id: Option<String>,
    },
    /// Answer to a probe we never send; accepted and ignored.
    Pong {
        #[serde(default)]
        id: Option<String>,
    },
    /// Response to a `method` frame.
    Result {
        id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<RemoteError>,
    },
    /// Subscriptions confirmed.
    Ready {
        #[serde(default)]
        subs: Vec<String>,
    },
    /// Subscription rejected or ended by the server.
    Nosub {
        id: String,
        #[serde(default)]
        error: Option<RemoteError>,
    },
    /// Data pushed for a subscription.
    Changed {
        collection: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        fields: Option<Value>,
    },
    Added {
        #[serde(default)]
        collection: Option<String>,
    },
    Removed {
        #[serde(default)]
        collection: Option<String>,
    },
    /// Method side effects are visible; nothing to do for us.
    Updated {
        #[serde(default)]
        methods: Vec<String>,
    },
    /// Server could not understand something we sent.
    Error {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ServerFrame {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for envelopes without a `msg` field (the
    /// `{"server_id":"0"}` banner), and a protocol error for anything
    /// malformed or unknown.
    pub fn decode(text: &str) -> RlResult<Option<Self>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RlError::Protocol(format!("invalid json: {e}")))?;
        if value.get("msg").is_none() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RlError::Protocol(format!("unrecognized frame: {e}")))
    }

    /// Frame kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Failed { .. } => "failed",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Result { .. } => "result",
            Self::Ready { .. } => "ready",
            Self::Nosub { .. } => "nosub",
            Self::Changed { .. } => "changed",
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Updated { .. } => "updated",
            Self::Error { .. } => "error",
        }
    }
}

/// First element of `fields.args` in a `changed` frame.
pub fn changed_payload(fields: Option<&Value>) -> Option<&Value> {
    fields?.get("args")?.as_array()?.first()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_encoding() {
        let text = ClientFrame::handshake().encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"msg": "connect", "version": "1", "support": ["1"]}));
    }

    #[test]
    fn test_login_encoding() {
        let text = ClientFrame::login("7", "T").encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"msg": "method", "method": "login", "id": "7", "params": [{"resume": "T"}]})
        );
    }

    #[test]
    fn test_subscribe_encoding() {
        let frame = ClientFrame::subscribe("3", "stream-room-messages", "R1");
        assert_eq!(frame.kind(), "sub");
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"msg": "sub", "id": "3", "name": "stream-room-messages", "params": ["R1", false]})
        );
    }

    #[test]
    fn test_pong_omits_missing_id() {
        let text = ClientFrame::Pong { id: None }.encode().unwrap();
        assert_eq!(text, r#"{"msg":"pong"}"#);
        let text = ClientFrame::Pong { id: Some("p1".into()) }.encode().unwrap();
        assert_eq!(text, r#"{"msg":"pong","id":"p1"}"#);
    }

    #[test]
    fn test_decode_classifies_frames() {
        assert_eq!(
            ServerFrame::decode(r#"{"msg":"connected","session":"abc"}"#).unwrap(),
            Some(ServerFrame::Connected { session: Some("abc".into()) })
        );
        assert_eq!(
            ServerFrame::decode(r#"{"msg":"ping"}"#).unwrap(),
            Some(ServerFrame::Ping { id: None })
        );
        assert_eq!(
            ServerFrame::decode(r#"{"msg":"ready","subs":["2"]}"#).unwrap(),
            Some(ServerFrame::Ready { subs: vec!["2".into()] })
        );

        let frame = ServerFrame::decode(
            r#"{"msg":"changed","collection":"stream-room-messages","id":"id","fields":{"eventName":"R1","args":[{"_id":"m1","rid":"R1","msg":"hi"}]}}"#,
        )
        .unwrap()
        .unwrap();
        match frame {
            ServerFrame::Changed { collection, fields, .. } => {
                assert_eq!(collection, "stream-room-messages");
                let payload = changed_payload(fields.as_ref()).unwrap();
                assert_eq!(payload["_id"], "m1");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_decode_result_with_error() {
        let frame = ServerFrame::decode(
            r#"{"msg":"result","id":"1","error":{"error":403,"reason":"You've been logged out by the server."}}"#,
        )
        .unwrap()
        .unwrap();
        match frame {
            ServerFrame::Result { id, result, error } => {
                assert_eq!(id, "1");
                assert!(result.is_none());
                assert_eq!(error.unwrap().describe(), "You've been logged out by the server.");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_decode_banner_is_ignored() {
        assert_eq!(ServerFrame::decode(r#"{"server_id":"0"}"#).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(ServerFrame::decode("not json"), Err(RlError::Protocol(_))));
        assert!(matches!(
            ServerFrame::decode(r#"{"msg":"teleport"}"#),
            Err(RlError::Protocol(_))
        ));
        assert!(matches!(
            ServerFrame::decode(r#"{"msg":"result"}"#),
            Err(RlError::Protocol(_))
        ));
    }

    #[test]
    fn test_remote_error_describe_fallbacks() {
        let err = RemoteError { error: Some(json!(404)), reason: None, message: None };
        assert_eq!(err.describe(), "404");
        let err = RemoteError { error: None, reason: None, message: Some("nope".into()) };
        assert_eq!(err.describe(), "nope");
    }

    #[test]
    fn test_changed_payload_missing_args() {
        assert!(changed_payload(None).is_none());
        assert!(changed_payload(Some(&json!({"args": []}))).is_none());
        assert!(changed_payload(Some(&json!({"eventName": "R1"}))).is_none());
    }
}
