//! Cross-context message contract
//!
//! Requests are closed enums, so dispatch is exhaustive. Foreign JSON enters
//! through [`RelayRequest::from_value`], which is the only place an unknown
//! message type can show up.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::channel::FaultResponse;

/// Identifier of a browser tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requests the relay understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayRequest {
    /// Which tab is active in the current window?
    #[serde(alias = "GET_TAB_ID")]
    GetActiveTabId,
    /// Liveness probe, no side effects
    Ping,
    /// Ask the content service in `tab_id` for the current transcript
    ExtractConversation {
        #[serde(alias = "tabId")]
        tab_id: TabId,
    },
}

impl RelayRequest {
    /// Wire discriminants accepted by [`RelayRequest::from_value`]
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "GET_ACTIVE_TAB_ID",
        "GET_TAB_ID",
        "PING",
        "EXTRACT_CONVERSATION",
    ];

    /// Decode a raw `{type, ...payload}` message.
    ///
    /// Every failure is returned as the error response to send back.
    pub fn from_value(raw: Value) -> Result<Self, RelayResponse> {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Err(RelayResponse::error("Request missing type field"));
        };
        if !Self::KNOWN_TYPES.contains(&kind) {
            tracing::warn!(message_type = kind, "Unknown message type");
            return Err(RelayResponse::error("Unknown message type"));
        }
        let kind = kind.to_string();
        serde_json::from_value(raw)
            .map_err(|e| RelayResponse::error(format!("Malformed {kind} request: {e}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayRequest::GetActiveTabId => "GET_ACTIVE_TAB_ID",
            RelayRequest::Ping => "PING",
            RelayRequest::ExtractConversation { .. } => "EXTRACT_CONVERSATION",
        }
    }
}

/// Responses produced by the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayResponse {
    /// `{tabId}`
    ActiveTab(TabId),
    /// `{tabId: null, error}`
    NoActiveTab { error: String },
    /// `{status: "alive"}`
    Alive,
    /// `{text}`
    Conversation { text: String },
    /// `{error}`
    Error { error: String },
}

impl RelayResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RelayResponse::Error {
            error: message.into(),
        }
    }

    /// JSON shape for foreign contexts.
    pub fn to_value(&self) -> Value {
        match self {
            RelayResponse::ActiveTab(id) => json!({ "tabId": id }),
            RelayResponse::NoActiveTab { error } => json!({ "tabId": null, "error": error }),
            RelayResponse::Alive => json!({ "status": "alive" }),
            RelayResponse::Conversation { text } => json!({ "text": text }),
            RelayResponse::Error { error } => json!({ "error": error }),
        }
    }
}

impl FaultResponse for RelayResponse {
    fn fault(message: String) -> Self {
        RelayResponse::Error { error: message }
    }
}

/// Requests a tab's content service understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabRequest {
    ExtractConversation,
}

/// Content service reply: `{text}` or `{text: "", error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TabResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }
}

impl FaultResponse for TabResponse {
    fn fault(message: String) -> Self {
        Self {
            text: String::new(),
            error: Some(message),
        }
    }
}
