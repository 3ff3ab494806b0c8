//! Reconnecting client for the Mopidy JSON-RPC WebSocket API
//!
//! The client keeps one connection to a Mopidy server alive, turns the
//! server's method catalog into a tree of callables, and republishes
//! everything it observes through an event hub.
//!
//! # Core Features
//!
//! - **Pluggable transport**: tokio-tungstenite by default, any
//!   [`TransportFactory`] for tests or embedding
//! - **Event hub**: exact, `prefix:*` and `*` subscriptions
//! - **Auto-Reconnection**: exponential backoff, reset on every open
//! - **Request tracking**: responses matched by id, in any order; every
//!   pending call is rejected when the connection closes
//! - **Dynamic API**: `core.describe` becomes `client.call("playback.play", ..)`
//! - **Observability**: OpenTelemetry metrics and tracing spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mopidy_client::{CallingConvention, MopidyClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MopidyClient::builder()
//!         .url("ws://localhost:6680/mopidy/ws")
//!         .calling_convention(CallingConvention::ByPositionOrByName)
//!         .build()
//!         .await?;
//!
//!     client.on("event:*", |event| async move {
//!         println!("{}: {}", event.name, event.payload);
//!     }).await;
//!
//!     client.wait_until_online().await;
//!     let state = client.call("playback.getState", vec![]).await?;
//!     println!("Playback state: {}", state);
//!
//!     client.call("mixer.setVolume", vec![json!({"volume": 30})]).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
mod client;
mod client_builder;
mod connection_state;
pub mod events;
mod metrics;
mod reconnect;
mod request;
mod router;
pub mod transport;
mod websocket;

pub use api::{ApiMethod, ApiNode, ApiTree, CallingConvention, MethodCatalog, MethodNaming};
pub use client::{MopidyClient, DESCRIBE_METHOD};
pub use client_builder::{default_url, default_url_for, ClientBuilder, ConnectionSettings};
pub use connection_state::{ConnectionState, ConnectionTracker};
pub use events::{Event, EventHub, EventQueue, SubscriptionId, ALL_EVENTS};
pub use metrics::ClientMetrics;
pub use reconnect::ExponentialBackoff;
pub use request::{RequestDispatcher, TransportSlot};
pub use router::MessageRouter;
pub use transport::{
    ReadyState, Transport, TransportFactory, TransportFailure, TransportSignal, TransportSignals,
};
pub use websocket::WebSocketConnector;
