// ABOUTME: Data models for roost-client
// ABOUTME: Typed payloads for the gateway RPC surface and pushed events

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A push event from the gateway (agent output, chat finals, presence).
/// `seq` orders events within one connection generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub event: String,
    pub seq: i64,
    pub payload: Option<Value>,
}

/// One conversation known to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub key: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

/// A block of message content. Text is the only kind the gateway emits
/// today; unknown kinds deserialize with empty text rather than failing
/// the whole history fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
        }
    }
}

/// A single message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Gateway self-report from the `status` method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// One scheduled-run record from the run-history surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "startedAtMs")]
    pub started_at_ms: Option<i64>,
}
