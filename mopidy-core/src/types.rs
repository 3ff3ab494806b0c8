//! JSON-RPC 2.0 wire types spoken by the Mopidy WebSocket endpoint
//!
//! The client only ever sends requests and only ever receives responses
//! or server-pushed events, so this module is asymmetric on purpose:
//! outgoing envelopes are typed structs, while inbound messages keep the
//! raw JSON around so callers can see exactly what the server sent.
//!
//! # Request IDs
//!
//! Requests always carry an integer id. Responses may carry any id shape
//! the server chooses (string, number, null), which is why [`Id`] stays an
//! untagged enum: a response with a non-integer id can never match a
//! pending request, but it still has to be represented to be reported.

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version tag carried by every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 response identifier as received from the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Integer identifier (the only shape this client sends)
    Number(i64),
    /// String identifier
    String(String),
    /// Null identifier, used by servers for unattributable errors
    Null,
}

impl Id {
    /// The request id this response can correlate with, if any
    pub fn as_request_id(&self) -> Option<u64> {
        match self {
            Id::Number(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Interpret a raw JSON `id` value
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Id::Number)
                .unwrap_or_else(|| Id::String(n.to_string())),
            serde_json::Value::String(s) => Id::String(s.clone()),
            serde_json::Value::Null => Id::Null,
            other => Id::String(other.to_string()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{}", n),
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Outgoing JSON-RPC 2.0 request envelope
///
/// Field order matches the wire layout `{"jsonrpc","id","method","params"}`.
/// `params` is omitted entirely when absent, never sent as `null` or `[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// How a response settles its request
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The `result` member was present (its value may be `null`)
    Result(serde_json::Value),
    /// The `error` member was present and `result` was not
    Error(JsonRpcErrorData),
    /// Neither `result` nor `error` was present
    Malformed,
}

/// An inbound message that carries an `id` member
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub id: Id,
    pub outcome: ResponseOutcome,
    /// The full message as received, kept for diagnostics
    pub raw: serde_json::Value,
}

/// A server-pushed event such as `{"event":"track_playback_started", ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    /// Event name exactly as the server sent it (`snake_case`)
    pub name: String,
    /// Every member of the message except `event`
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Close payload reported by a transport when the channel shuts down
///
/// Mirrors the information a WebSocket close frame carries. A connection
/// that dies without a close handshake is reported with code `1006`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    /// Normal closure (1000)
    pub fn normal() -> Self {
        Self {
            code: 1000,
            reason: String::new(),
            was_clean: true,
        }
    }

    /// Abnormal closure (1006), used when no close frame was exchanged
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: 1006,
            reason: reason.into(),
            was_clean: false,
        }
    }
}
