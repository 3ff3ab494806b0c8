//! Error types for the Mopidy client
//!
//! Every failure a caller can observe settles their pending call with one
//! [`Error`]. The variants group into four families (see [`ErrorKind`]):
//!
//! - **Connection**: the transport was not open, or it closed while the
//!   call was in flight. Recoverable by reconnection.
//! - **Server**: the server answered with a JSON-RPC error object.
//! - **Protocol**: the server answered with something that is neither a
//!   result nor an error.
//! - **Usage**: the arguments handed to a generated API method have the
//!   wrong shape. Rejected before any I/O happens.
//!
//! # Examples
//!
//! ```rust
//! use mopidy_core::{Error, ErrorKind};
//!
//! let error = Error::connection("WebSocket is closed");
//! assert_eq!(error.kind(), ErrorKind::Connection);
//! assert_eq!(error.to_string(), "WebSocket is closed");
//! ```

use crate::types::CloseInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Mopidy client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message carried by every request rejected because the connection closed.
pub const WEBSOCKET_CLOSED: &str = "WebSocket closed";

/// Message of a response that has neither `result` nor `error`.
pub const MALFORMED_RESPONSE: &str = "Response without 'result' or 'error' received";

/// Message for a call with more than one argument under by-position-or-by-name.
pub const EXPECTED_ARGUMENTS: &str = "Expected zero arguments, a single array, or a single object.";

/// Message for a single argument that is neither an array nor an object.
pub const EXPECTED_ARRAY_OR_OBJECT: &str = "Expected an array or an object.";

/// Application-level error type
///
/// `Clone` is required because a single connection close settles every
/// pending request with the same error value.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The transport is unavailable, or it closed before a response arrived
    ///
    /// `close` holds the payload the transport reported when the
    /// connection went away; it is `None` when the transport was simply
    /// not open at call time.
    #[error("{message}")]
    Connection {
        message: String,
        close: Option<CloseInfo>,
    },

    /// The server returned a JSON-RPC error object
    #[error("{}", .0.message)]
    Server(JsonRpcErrorData),

    /// The response matched a request but had neither `result` nor `error`
    #[error("Response without 'result' or 'error' received")]
    MalformedResponse { response: serde_json::Value },

    /// Wrong number of arguments for a generated API method
    #[error("{0}")]
    Usage(String),

    /// A single argument that is neither an array nor an object
    #[error("{0}")]
    Type(String),

    /// Inbound text that is not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No generated API method exists at the requested path
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invariant broken inside the client
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Server,
    Protocol,
    Usage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Server => "server",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Usage => "usage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Connection error without a close payload
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            close: None,
        }
    }

    /// The error every pending request receives when the transport closes
    pub fn websocket_closed(close: CloseInfo) -> Self {
        Error::Connection {
            message: WEBSOCKET_CLOSED.to_string(),
            close: Some(close),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } | Error::WebSocket(_) => ErrorKind::Connection,
            Error::Server(_) => ErrorKind::Server,
            Error::MalformedResponse { .. } | Error::Parse(_) | Error::Serialization(_) => {
                ErrorKind::Protocol
            }
            Error::Usage(_) | Error::Type(_) | Error::MethodNotFound(_) | Error::Config(_) => {
                ErrorKind::Usage
            }
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// The close payload attached to a connection error, if any
    pub fn close_info(&self) -> Option<&CloseInfo> {
        match self {
            Error::Connection { close, .. } => close.as_ref(),
            _ => None,
        }
    }

    /// Diagnostic data attached to the error
    ///
    /// For server errors this is the server's optional `data` member. For
    /// malformed responses it is `{"response": <the full response>}`.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Error::Server(error) => error.data.clone(),
            Error::MalformedResponse { response } => {
                Some(serde_json::json!({ "response": response }))
            }
            _ => None,
        }
    }
}

/// JSON-RPC 2.0 error object as sent by the server
///
/// `data` distinguishes "absent" (`None`) from an explicit `null`
/// (`Some(Value::Null)`); no default is substituted for a missing member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Read an error object leniently, member by member
    ///
    /// Servers are not always strict about the error shape; a missing
    /// code reads as `0` and a missing message as an empty string.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            code: value.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
            data: value.get("data").cloned(),
        }
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
