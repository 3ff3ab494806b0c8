//! WebSocket transport built on tokio-tungstenite
//!
//! Each [`WebSocketConnector::create`] spawns one I/O task that owns the
//! socket. The returned handle only holds the shared ready state and a
//! queue into that task, so `send` and `close` never block.
//!
//! # Signal sequence
//!
//! ```text
//! connect ok    → opened, (message)*, closed
//! connect error → errored, closed(1006)
//! read error    → errored, closed(1006 unless a close frame was seen)
//! ```

use crate::transport::{
    ReadyState, SharedReadyState, Transport, TransportFactory, TransportFailure, TransportSignals,
};
use futures::{SinkExt, StreamExt};
use mopidy_core::{CloseInfo, Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Default [`TransportFactory`] opening real WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketConnector {
    fn create(&self, url: &str, signals: TransportSignals) -> Result<Arc<dyn Transport>> {
        let state = SharedReadyState::new(ReadyState::Connecting);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(
            url.to_string(),
            state.clone(),
            outgoing_rx,
            signals,
        ));

        Ok(Arc::new(WebSocketTransport {
            state,
            outgoing: outgoing_tx,
        }))
    }
}

struct WebSocketTransport {
    state: SharedReadyState,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl Transport for WebSocketTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: &str) -> Result<()> {
        if self.state.get() != ReadyState::Open {
            return Err(Error::WebSocket("socket is not open".to_string()));
        }
        self.outgoing
            .send(Message::Text(text.to_string()))
            .map_err(|_| Error::WebSocket("socket task has stopped".to_string()))
    }

    fn close(&self) {
        let closing = self.state.transition(ReadyState::Open, ReadyState::Closing)
            || self.state.transition(ReadyState::Connecting, ReadyState::Closing);
        if closing {
            let _ = self.outgoing.send(Message::Close(None));
        }
    }
}

#[tracing::instrument(skip(state, outgoing, signals))]
async fn run_socket(
    url: String,
    state: SharedReadyState,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    signals: TransportSignals,
) {
    let ws_stream = match connect_async(&url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            state.set(ReadyState::Closed);
            signals.errored(TransportFailure::new(e.to_string()).with_detail(format!("{:?}", e)));
            signals.closed(CloseInfo::abnormal(e.to_string()));
            return;
        }
    };

    // A close() that raced the handshake leaves us in Closing with a
    // queued close frame; the loop below sends it.
    if state.transition(ReadyState::Connecting, ReadyState::Open) {
        tracing::debug!("WebSocket open");
        signals.opened();
    }

    let (mut sink, mut stream) = ws_stream.split();
    let mut close_info: Option<CloseInfo> = None;

    loop {
        tokio::select! {
            queued = outgoing.recv() => {
                let Some(message) = queued else {
                    // Handle dropped without close(); shut the socket.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(message).await {
                    signals.errored(
                        TransportFailure::new(e.to_string()).with_detail(format!("{:?}", e)),
                    );
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => signals.message(text),
                Some(Ok(Message::Close(frame))) => {
                    state.set(ReadyState::Closing);
                    close_info = Some(match frame {
                        Some(frame) => CloseInfo {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                            was_clean: true,
                        },
                        None => CloseInfo {
                            code: 1005,
                            reason: String::new(),
                            was_clean: true,
                        },
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    signals.errored(
                        TransportFailure::new(e.to_string()).with_detail(format!("{:?}", e)),
                    );
                    break;
                }
                None => break,
            }
        }
    }

    state.set(ReadyState::Closed);
    signals.closed(close_info.unwrap_or_else(|| CloseInfo::abnormal("connection lost")));
}
