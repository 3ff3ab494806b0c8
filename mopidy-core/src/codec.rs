//! Codec for the Mopidy WebSocket message stream
//!
//! Outgoing traffic is always a single JSON-RPC request. Incoming traffic
//! is one of two things: a response to one of our requests, or an event
//! the server pushes on its own (`{"event": "...", ...}`). Anything else
//! is reported as [`InboundMessage::Unknown`] so the caller can log it.
//!
//! # Classification
//!
//! Classification works on member *presence*, not on deserializing into a
//! fixed struct, because presence is what carries the meaning here:
//!
//! - an object with an `id` member is a response
//! - otherwise, an object with an `event` member is a server event
//! - everything else is unknown
//!
//! Inside a response, `result` wins over `error`, and a `result` whose
//! value is `null` is still a result.
//!
//! # Examples
//!
//! ```rust
//! use mopidy_core::{codec, InboundMessage, ResponseOutcome};
//!
//! let msg = codec::decode_inbound(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
//! match msg {
//!     InboundMessage::Response(resp) => {
//!         assert_eq!(resp.outcome, ResponseOutcome::Result(serde_json::Value::Null));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{Id, JsonRpcRequest, ResponseMessage, ResponseOutcome, ServerEvent};
use serde::Serialize;

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Response(ResponseMessage),
    Event(ServerEvent),
    Unknown(serde_json::Value),
}

impl InboundMessage {
    pub fn is_response(&self) -> bool {
        matches!(self, InboundMessage::Response(_))
    }

    pub fn is_event(&self) -> bool {
        matches!(self, InboundMessage::Event(_))
    }
}

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Parse and classify one inbound text message
///
/// Returns [`Error::Parse`] when the text is not JSON. Valid JSON never
/// fails; shapes that are neither responses nor events come back as
/// [`InboundMessage::Unknown`].
pub fn decode_inbound(data: &str) -> Result<InboundMessage> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(classify(value))
}

/// Classify an already-parsed JSON value
pub fn classify(value: serde_json::Value) -> InboundMessage {
    let Some(object) = value.as_object() else {
        return InboundMessage::Unknown(value);
    };

    if let Some(id) = object.get("id") {
        let id = Id::from_value(id);
        let outcome = if let Some(result) = object.get("result") {
            ResponseOutcome::Result(result.clone())
        } else if let Some(error) = object.get("error") {
            ResponseOutcome::Error(JsonRpcErrorData::from_value(error))
        } else {
            ResponseOutcome::Malformed
        };
        return InboundMessage::Response(ResponseMessage {
            id,
            outcome,
            raw: value,
        });
    }

    if let Some(name) = object.get("event").and_then(|e| e.as_str()) {
        let name = name.to_string();
        let mut fields = object.clone();
        fields.remove("event");
        return InboundMessage::Event(ServerEvent { name, fields });
    }

    InboundMessage::Unknown(value)
}
