//! Core JSON-RPC 2.0 types and codec for the Mopidy WebSocket API
//!
//! This crate holds everything about the wire that does not depend on a
//! runtime or a transport:
//!
//! - **Types**: request envelopes, server error objects, close payloads
//! - **Codec**: request encoding and classification of inbound messages
//!   into responses, server events, or unknown payloads
//! - **Error handling**: the error taxonomy surfaced to callers
//! - **Naming**: `snake_case` to `camelCase` conversion used for server
//!   event names and API paths
//! - **Observability**: OpenTelemetry and `tracing-subscriber` bootstrap
//!
//! # Example
//!
//! ```rust
//! use mopidy_core::{codec, InboundMessage, JsonRpcRequest};
//!
//! let request = JsonRpcRequest::new("core.playback.get_state", None, 0);
//! let text = codec::encode_request(&request).unwrap();
//! assert_eq!(text, r#"{"jsonrpc":"2.0","id":0,"method":"core.playback.get_state"}"#);
//!
//! let inbound = codec::decode_inbound(r#"{"event":"volume_changed","volume":42}"#).unwrap();
//! assert!(matches!(inbound, InboundMessage::Event(_)));
//! ```

pub mod codec;
pub mod error;
pub mod naming;
pub mod observability;
pub mod types;

pub use codec::InboundMessage;
pub use error::{Error, ErrorKind, JsonRpcErrorData, Result};
pub use naming::snake_to_camel;
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    CloseInfo, Id, JsonRpcRequest, ResponseMessage, ResponseOutcome, ServerEvent,
    JSONRPC_VERSION,
};
