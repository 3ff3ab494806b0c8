//! Transport capability consumed by the client
//!
//! The client never opens sockets itself. It asks a [`TransportFactory`]
//! for a [`Transport`] pointed at a URL and hands it a [`TransportSignals`]
//! handle; the transport reports its four lifecycle signals through that
//! handle and the client processes them one at a time, in arrival order.
//!
//! The default factory is [`WebSocketConnector`](crate::WebSocketConnector).
//! Tests and embedders can inject their own factory through
//! [`ClientBuilder::with_transport`](crate::ClientBuilder::with_transport).

use mopidy_core::{CloseInfo, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle state of a transport, mirroring the WebSocket `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// `ReadyState` that can be shared between a transport handle and its I/O task
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `current` to `new` only if the state is still `current`
    pub fn transition(&self, current: ReadyState, new: ReadyState) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Error payload reported through [`TransportSignals::errored`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportFailure {
    pub message: String,
    /// Extended detail (error chain, debug output) when the transport has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// What gets logged: the detail when present, otherwise the message
    pub fn diagnostic(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.message)
    }
}

/// One lifecycle signal from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Opened,
    Closed(CloseInfo),
    Errored(TransportFailure),
    Message(String),
}

/// Handle a transport uses to report its lifecycle signals
///
/// Cloning is cheap. Signals sent after the client is gone are dropped.
#[derive(Debug, Clone)]
pub struct TransportSignals {
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl TransportSignals {
    pub fn new(tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self { tx }
    }

    /// A handle plus the receiving end, for driving a transport by hand
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn opened(&self) {
        self.emit(TransportSignal::Opened);
    }

    pub fn closed(&self, close: CloseInfo) {
        self.emit(TransportSignal::Closed(close));
    }

    pub fn errored(&self, failure: TransportFailure) {
        self.emit(TransportSignal::Errored(failure));
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportSignal::Message(text.into()));
    }

    fn emit(&self, signal: TransportSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("Transport signal dropped, client is gone");
        }
    }
}

/// A duplex text channel to the server
pub trait Transport: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queue one text message; fails when the transport is not open
    fn send(&self, text: &str) -> Result<()>;

    /// Begin closing; completion is reported through `closed`
    fn close(&self);
}

/// Creates transports for the client
///
/// Called once per connection attempt. The returned transport starts in
/// [`ReadyState::Connecting`] (or later) and reports through `signals`.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str, signals: TransportSignals) -> Result<Arc<dyn Transport>>;
}
