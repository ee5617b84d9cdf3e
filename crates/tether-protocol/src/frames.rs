//! Gateway wire frames — JSON messages between the client and the gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single frame on the wire, discriminated by the `type` field.
///
/// Anything that does not parse as one of these variants is dropped by the
/// client; a misbehaving gateway must never crash the near end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client → Gateway request
    Req {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },
    /// Gateway → Client response, correlated by `id`
    Res {
        id: String,
        ok: bool,
        #[serde(default)]
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ResError>,
    },
    /// Gateway → Client out-of-band event (no request ID)
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Error carried in a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResError {
    pub message: String,
}

impl Frame {
    /// Build a request frame with a fresh UUID id. Returns `(id, frame)` so the
    /// caller can register the pending entry before sending.
    pub fn request(method: impl Into<String>, params: Value) -> (String, Self) {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = Frame::Req {
            id: id.clone(),
            method: method.into(),
            params,
        };
        (id, frame)
    }
}

// ── Well-known methods ──

/// Methods the client calls
pub mod methods {
    pub const CONNECT: &str = "connect";
    pub const CHAT_SEND: &str = "chat.send";
    pub const CHAT_HISTORY: &str = "chat.history";
}

/// Events the gateway pushes
pub mod events {
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    pub const CHAT: &str = "chat";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialize() {
        let (id, frame) = Frame::request(methods::CHAT_SEND, serde_json::json!({"message": "hi"}));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"req\""));
        assert!(json.contains("\"method\":\"chat.send\""));
        assert!(json.contains(&id));
    }

    #[test]
    fn test_response_deserialize_ok() {
        let json = r#"{"type":"res","id":"r1","ok":true,"payload":{"messages":[]}}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        match frame {
            Frame::Res { id, ok, error, .. } => {
                assert_eq!(id, "r1");
                assert!(ok);
                assert!(error.is_none());
            }
            other => panic!("expected res frame, got {other:?}"),
        }
    }

    #[test]
    fn test_response_deserialize_error() {
        let json = r#"{"type":"res","id":"r2","ok":false,"error":{"message":"denied"}}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        match frame {
            Frame::Res { ok, error, .. } => {
                assert!(!ok);
                assert_eq!(error.unwrap().message, "denied");
            }
            other => panic!("expected res frame, got {other:?}"),
        }
    }

    #[test]
    fn test_event_deserialize() {
        let json = r#"{"type":"event","event":"connect.challenge","payload":{"nonce":"abc"}}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        match frame {
            Frame::Event { event, payload } => {
                assert_eq!(event, events::CONNECT_CHALLENGE);
                assert_eq!(payload["nonce"], "abc");
            }
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type":"ping"}"#;
        assert!(serde_json::from_str::<Frame>(json).is_err());
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(serde_json::from_str::<Frame>("not json").is_err());
    }
}
