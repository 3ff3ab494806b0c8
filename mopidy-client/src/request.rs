//! Request dispatch and the pending-request registry
//!
//! # Request Lifecycle
//!
//! 1. **Check**: the current transport must be open, otherwise the call
//!    fails at once with a connection error naming the exact state
//! 2. **Register**: assign the next id and park a oneshot sender under it
//! 3. **Announce**: queue `websocket:outgoingMessage` with the envelope
//! 4. **Send**: hand the serialized envelope to the transport
//! 5. **Settle**: the router completes the entry when a response with the
//!    same id arrives, or the client rejects every entry when the
//!    connection closes
//!
//! Steps 2 to 4 run under the registry lock without awaiting anything, so
//! requests reach the transport in id order. Ids start at 0, only ever
//! grow, and are never reused within one client, even after a request was
//! rejected.

use crate::events::{EventQueue, WEBSOCKET_OUTGOING_MESSAGE};
use crate::metrics::ClientMetrics;
use crate::transport::{ReadyState, Transport};
use mopidy_core::{codec, Error, JsonRpcRequest, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex, RwLock};

/// Slot holding the transport of the current connection attempt
pub type TransportSlot = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// One in-flight call
pub struct PendingRequest {
    pub method: String,
    started: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Connection error for a transport that is not open
pub fn not_ready_error(state: Option<ReadyState>) -> Error {
    let message = match state {
        Some(ReadyState::Connecting) => "WebSocket is still connecting",
        Some(ReadyState::Closing) => "WebSocket is closing",
        Some(ReadyState::Closed) | None => "WebSocket is closed",
        Some(ReadyState::Open) => "WebSocket is open",
    };
    Error::connection(message)
}

/// Sends requests and tracks them until they settle
#[derive(Clone)]
pub struct RequestDispatcher {
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    counter: Arc<AtomicU64>,
    transport: TransportSlot,
    events: EventQueue,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RequestDispatcher {
    pub fn new(transport: TransportSlot, events: EventQueue) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
            transport,
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send one request and wait for it to settle
    ///
    /// `params` is sent verbatim; `None` leaves the member out entirely.
    #[tracing::instrument(skip(self, params), fields(id))]
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let transport = self.transport.read().await.clone();
        let transport = match transport {
            Some(transport) if transport.ready_state() == ReadyState::Open => transport,
            other => {
                let error = not_ready_error(other.map(|t| t.ready_state()));
                tracing::debug!(error = %error, "Request rejected, transport not open");
                self.record_error(&error);
                return Err(error);
            }
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            let id = self.counter.fetch_add(1, Ordering::SeqCst);
            tracing::Span::current().record("id", id);

            let request = JsonRpcRequest::new(method, params, id);
            let envelope =
                serde_json::to_value(&request).map_err(|e| Error::Serialization(e.to_string()))?;
            let text = codec::encode_request(&request)?;

            pending.insert(
                id,
                PendingRequest {
                    method: method.to_string(),
                    started: Instant::now(),
                    tx,
                },
            );
            self.events.push(WEBSOCKET_OUTGOING_MESSAGE, envelope);

            if let Some(ref metrics) = self.metrics {
                metrics.record_request(method);
            }

            if let Err(e) = transport.send(&text) {
                pending.remove(&id);
                drop(pending);
                tracing::warn!(error = %e, "Transport refused request");
                self.record_error(&e);
                return Err(e);
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal("pending request dropped".to_string())),
        }
    }

    /// Remove and return the pending entry for `id`
    pub async fn take(&self, id: u64) -> Option<PendingRequest> {
        self.pending.lock().await.remove(&id)
    }

    /// Settle the request registered under `id`; false when nothing matched
    pub async fn complete(&self, id: u64, result: Result<Value>) -> bool {
        match self.take(id).await {
            Some(pending) => {
                self.settle(pending, result);
                true
            }
            None => false,
        }
    }

    /// Reject every pending request with `error`, leaving the registry empty
    pub async fn reject_all(&self, error: Error) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, p)| p).collect()
        };

        let count = drained.len();
        for pending in drained {
            self.settle(pending, Err(error.clone()));
        }
        if count > 0 {
            tracing::debug!(count, error = %error, "Rejected pending requests");
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Ids currently waiting for a response, in ascending order
    pub async fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn settle(&self, pending: PendingRequest, result: Result<Value>) {
        if let Some(ref metrics) = self.metrics {
            let outcome = match &result {
                Ok(_) => "result",
                Err(e) => e.kind().as_str(),
            };
            metrics.record_response(
                &pending.method,
                outcome,
                pending.started.elapsed().as_secs_f64(),
            );
        }
        // The caller may have stopped waiting; nothing to do then.
        let _ = pending.tx.send(result);
    }

    fn record_error(&self, error: &Error) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_error(error.kind().as_str());
        }
    }
}
