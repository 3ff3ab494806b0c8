//! Mopidy WebSocket client
//!
//! Convenience crate re-exporting the Mopidy sub-crates under one name.
//!
//! # Architecture
//!
//! - **mopidy-core**: JSON-RPC types, codec, error taxonomy, naming helpers
//!   and the observability bootstrap
//! - **mopidy-client**: transport, event hub, reconnection, request
//!   dispatch and the API tree built from `core.describe`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mopidy::{CallingConvention, MopidyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MopidyClient::builder()
//!         .url("ws://localhost:6680/mopidy/ws")
//!         .calling_convention(CallingConvention::ByPositionOrByName)
//!         .build()
//!         .await?;
//!
//!     client.wait_until_online().await;
//!     for path in client.api().await.method_paths() {
//!         println!("{}", path);
//!     }
//!     Ok(())
//! }
//! ```

pub use mopidy_client as client;
pub use mopidy_core as core;

pub use mopidy_client::{CallingConvention, ClientBuilder, ConnectionState, MopidyClient};
pub use mopidy_core::{Error, Result};
