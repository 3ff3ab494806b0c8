//! Connection state tracking
//!
//! # Connection States
//!
//! - **Offline**: no usable connection (initial state, and after a close)
//! - **Connecting**: `connect()` was invoked; waiting for the transport to
//!   open and for the API catalog to be fetched
//! - **Online**: the transport is open and the API tree has been rebuilt
//!
//! # State Transitions
//!
//! ```text
//! Offline → Connecting → Online
//!    ↑          |          |
//!    └──────────┴──────────┘   (transport closed)
//! ```
//!
//! The state is published through a `tokio::sync::watch` channel so that
//! callers can wait for a particular state without polling.

use tokio::sync::watch;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Offline,
    Connecting,
    Online,
}

impl ConnectionState {
    /// Value reported on the connection-state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Offline => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Online => 2,
        }
    }
}

/// Owner of the current [`ConnectionState`]
#[derive(Debug)]
pub struct ConnectionTracker {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Offline);
        Self { tx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Set the state; returns whether it changed
    pub fn set(&self, state: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::debug!(from = ?*current, to = ?state, "Connection state changed");
                *current = state;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Wait until the state equals `target`
    pub async fn wait_for(&self, target: ConnectionState) {
        let mut rx = self.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state == target).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
