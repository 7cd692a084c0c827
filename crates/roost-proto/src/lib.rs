// ABOUTME: Wire frame types for the roost gateway protocol
// ABOUTME: Request/response/event frames plus structured error payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single frame on the gateway WebSocket.
///
/// The gateway speaks a JSON protocol where every message carries a `type`
/// discriminator: `req` (client to gateway), `res` (gateway to client,
/// correlated by `id`), or `event` (gateway push, ordered by `seq`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Req {
        id: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Res {
        id: String,
        #[serde(default)]
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorPayload>,
    },
    Event {
        event: String,
        #[serde(default)]
        seq: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl Frame {
    /// Build a request frame.
    pub fn req(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Frame::Req {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a frame from wire text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Structured error attached to a failed response frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the gateway does not recognize the method.
    ///
    /// The RPC surface has been renamed across gateway versions, so callers
    /// probe an ordered list of method names; this is the category that
    /// means "try the next name". Older gateways report it only through the
    /// message text, newer ones through the code.
    pub fn is_method_not_found(&self) -> bool {
        matches!(
            self.code.as_str(),
            "method_not_found" | "unknown_method" | "unsupported_method"
        ) || {
            let msg = self.message.to_lowercase();
            msg.contains("unsupported method")
                || msg.contains("unknown method")
                || msg.contains("method not found")
        }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_req_frame_serializes_with_type_tag() {
        let frame = Frame::req("abc-1", "sessions.list", json!({"limit": 10}));
        let text = frame.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "req");
        assert_eq!(value["id"], "abc-1");
        assert_eq!(value["method"], "sessions.list");
        assert_eq!(value["params"]["limit"], 10);
    }

    #[test]
    fn test_res_frame_roundtrip_ok() {
        let text = r#"{"type":"res","id":"abc-1","ok":true,"payload":{"sessions":[]}}"#;
        let frame = Frame::from_json(text).unwrap();
        match frame {
            Frame::Res {
                id, ok, payload, ..
            } => {
                assert_eq!(id, "abc-1");
                assert!(ok);
                assert_eq!(payload.unwrap()["sessions"], json!([]));
            }
            other => panic!("expected res frame, got {:?}", other),
        }
    }

    #[test]
    fn test_res_frame_with_error() {
        let text = r#"{"type":"res","id":"x","ok":false,"error":{"code":"bridge_error","message":"boom"}}"#;
        let frame = Frame::from_json(text).unwrap();
        match frame {
            Frame::Res { ok, error, .. } => {
                assert!(!ok);
                let err = error.unwrap();
                assert_eq!(err.code, "bridge_error");
                assert_eq!(err.message, "boom");
            }
            other => panic!("expected res frame, got {:?}", other),
        }
    }

    #[test]
    fn test_event_frame_roundtrip() {
        let text = r#"{"type":"event","event":"connect.challenge","seq":0,"payload":{"nonce":7}}"#;
        let frame = Frame::from_json(text).unwrap();
        match frame {
            Frame::Event {
                event,
                seq,
                payload,
            } => {
                assert_eq!(event, "connect.challenge");
                assert_eq!(seq, 0);
                assert_eq!(payload.unwrap()["nonce"], 7);
            }
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[test]
    fn test_event_frame_missing_seq_defaults_to_zero() {
        let text = r#"{"type":"event","event":"agent"}"#;
        let frame = Frame::from_json(text).unwrap();
        match frame {
            Frame::Event { seq, payload, .. } => {
                assert_eq!(seq, 0);
                assert!(payload.is_none());
            }
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[test]
    fn test_method_not_found_by_code() {
        for code in ["method_not_found", "unknown_method", "unsupported_method"] {
            let err = ErrorPayload::new(code, "whatever");
            assert!(err.is_method_not_found(), "code {} should classify", code);
        }
    }

    #[test]
    fn test_method_not_found_by_message() {
        let err = ErrorPayload::new("bridge_error", "unsupported method: cron.runs");
        assert!(err.is_method_not_found());

        let err = ErrorPayload::new("error", "Method Not Found");
        assert!(err.is_method_not_found());
    }

    #[test]
    fn test_other_errors_do_not_classify_as_method_not_found() {
        let err = ErrorPayload::new("precondition_failed", "config changed underneath you");
        assert!(!err.is_method_not_found());

        let err = ErrorPayload::new("bridge_error", "missing params.message");
        assert!(!err.is_method_not_found());
    }

    #[test]
    fn test_error_payload_display() {
        let err = ErrorPayload::new("not_found", "no such session");
        assert_eq!(err.to_string(), "not_found: no such session");
    }
}
