//! Common test utilities for mopidy-client integration tests
//!
//! Two ways to stand in for a Mopidy server:
//!
//! - [`MockConnector`]: an in-memory [`TransportFactory`]. Each connection
//!   attempt yields a [`MockConnection`] the test drives by hand (open it,
//!   push messages, close it) while inspecting what the client sent.
//! - [`MockWsServer`]: a real WebSocket server on a loopback port, for
//!   end-to-end tests through the tokio-tungstenite transport.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use mopidy_client::transport::SharedReadyState;
use mopidy_client::{
    MopidyClient, ReadyState, Transport, TransportFactory, TransportFailure, TransportSignals,
};
use mopidy_core::{CloseInfo, Error, Result};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// Response envelope for `id`
pub fn mock_response(id: &Value, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

pub fn mock_error_response(id: &Value, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

pub fn mock_event(name: &str, fields: Value) -> String {
    let mut event = fields.as_object().cloned().unwrap_or_default();
    event.insert("event".to_string(), json!(name));
    Value::Object(event).to_string()
}

/// A small `core.describe` result
pub fn sample_catalog() -> Value {
    json!({
        "core.describe": {"description": "Describe the API", "params": []},
        "core.playback.get_state": {"description": "Get playback state", "params": []},
        "core.playback.play": {
            "description": "Play",
            "params": [{"name": "tl_track", "default": null}, {"name": "tlid", "default": null}]
        },
        "core.mixer.set_volume": {"params": [{"name": "volume"}]},
        "core.tracklist.get_tl_tracks": {"params": []}
    })
}

/// Collects every event the client emits
pub async fn record_events(client: &MopidyClient) -> Arc<StdMutex<Vec<(String, Value)>>> {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    client
        .on_any(move |event| {
            let log = Arc::clone(&log_clone);
            async move { log.lock().unwrap().push((event.name, event.payload)) }
        })
        .await;
    log
}

/// Collects the payloads of one event
pub async fn record_event(client: &MopidyClient, name: &str) -> Arc<StdMutex<Vec<Value>>> {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    client
        .on(name, move |event| {
            let log = Arc::clone(&log_clone);
            async move { log.lock().unwrap().push(event.payload) }
        })
        .await;
    log
}

/// In-memory transport factory
pub struct MockConnector {
    created: mpsc::UnboundedSender<MockConnection>,
    count: AtomicUsize,
}

/// Receiving side of [`MockConnector`]: one item per connection attempt
pub struct MockConnections {
    rx: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, MockConnections) {
        let (created, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                created,
                count: AtomicUsize::new(0),
            }),
            MockConnections { rx },
        )
    }

    pub fn connection_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockConnector {
    fn create(&self, url: &str, signals: TransportSignals) -> Result<Arc<dyn Transport>> {
        let state = SharedReadyState::new(ReadyState::Connecting);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let send_attempts = Arc::new(AtomicUsize::new(0));

        let connection = MockConnection {
            url: url.to_string(),
            state: state.clone(),
            signals: signals.clone(),
            sent: Arc::new(Mutex::new(sent_rx)),
            send_attempts: Arc::clone(&send_attempts),
        };
        self.count.fetch_add(1, Ordering::SeqCst);
        let _ = self.created.send(connection);

        Ok(Arc::new(MockTransport {
            state,
            signals,
            sent: sent_tx,
            send_attempts,
        }))
    }
}

impl MockConnections {
    /// Next connection attempt, failing the test after [`WAIT`]
    pub async fn next(&mut self) -> MockConnection {
        self.next_within(WAIT).await
    }

    /// For tests on a paused clock, where long backoffs elapse instantly
    pub async fn next_within(&mut self, limit: Duration) -> MockConnection {
        tokio::time::timeout(limit, self.rx.recv())
            .await
            .expect("timed out waiting for a connection attempt")
            .expect("connector dropped")
    }

    pub fn try_next(&mut self) -> Option<MockConnection> {
        self.rx.try_recv().ok()
    }
}

struct MockTransport {
    state: SharedReadyState,
    signals: TransportSignals,
    sent: mpsc::UnboundedSender<String>,
    send_attempts: Arc<AtomicUsize>,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: &str) -> Result<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.get() != ReadyState::Open {
            return Err(Error::WebSocket("mock transport is not open".to_string()));
        }
        let _ = self.sent.send(text.to_string());
        Ok(())
    }

    /// Completes the close handshake immediately
    fn close(&self) {
        let closing = self.state.transition(ReadyState::Open, ReadyState::Closing)
            || self
                .state
                .transition(ReadyState::Connecting, ReadyState::Closing);
        if closing {
            self.state.set(ReadyState::Closed);
            self.signals.closed(CloseInfo::normal());
        }
    }
}

/// Test-side handle of one mock connection attempt
#[derive(Clone)]
pub struct MockConnection {
    pub url: String,
    state: SharedReadyState,
    signals: TransportSignals,
    sent: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    send_attempts: Arc<AtomicUsize>,
}

impl MockConnection {
    pub fn open(&self) {
        self.state.set(ReadyState::Open);
        self.signals.opened();
    }

    pub fn set_state(&self, state: ReadyState) {
        self.state.set(state);
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// Deliver a raw inbound message
    pub fn push(&self, text: impl Into<String>) {
        self.signals.message(text);
    }

    pub fn respond(&self, id: &Value, result: Value) {
        self.push(mock_response(id, result));
    }

    /// Server-side close with the given payload
    pub fn close_with(&self, close: CloseInfo) {
        self.state.set(ReadyState::Closed);
        self.signals.closed(close);
    }

    /// Connection attempt failing before it opens
    pub fn fail(&self, reason: &str) {
        self.state.set(ReadyState::Closed);
        self.signals
            .errored(TransportFailure::new(reason).with_detail(format!("mock: {}", reason)));
        self.signals.closed(CloseInfo::abnormal(reason));
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Next message the client sent, parsed
    pub async fn next_sent(&self) -> Value {
        self.next_sent_within(WAIT).await
    }

    pub async fn next_sent_within(&self, limit: Duration) -> Value {
        let mut sent = self.sent.lock().await;
        let text = tokio::time::timeout(limit, sent.recv())
            .await
            .expect("timed out waiting for the client to send")
            .expect("transport dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Open, answer `core.describe` with `catalog`, and wait until every
    /// `state:online` subscriber has run
    pub async fn bring_online(&self, client: &MopidyClient, catalog: Value) {
        // Catch-alls run last, in registration order: this one is the very last.
        let (online_tx, mut online_rx) = mpsc::unbounded_channel();
        let watcher = client
            .on_any(move |event| {
                let online_tx = online_tx.clone();
                async move {
                    if event.name == "state:online" {
                        let _ = online_tx.send(());
                    }
                }
            })
            .await;

        self.open();
        let describe = self.next_sent().await;
        assert_eq!(describe["method"], "core.describe");
        self.respond(&describe["id"], catalog);
        tokio::time::timeout(WAIT, online_rx.recv())
            .await
            .expect("client did not go online");
        client.off(watcher).await;
    }
}

/// What a [`MockWsServer`] handler sees and returns
pub type Handler = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(String),
    Disconnect,
}

/// Real WebSocket server answering JSON-RPC requests with a handler
pub struct MockWsServer {
    addr: SocketAddr,
    commands: broadcast::Sender<ServerCommand>,
    received: mpsc::UnboundedReceiver<Value>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: mpsc::Sender<()>,
}

impl MockWsServer {
    /// Server answering `core.describe` with [`sample_catalog`] and every
    /// other request through `handler`
    pub async fn mopidy<F>(handler: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        Self::with_handler(Arc::new(move |request: Value| {
            let id = request.get("id")?.clone();
            let method = request.get("method")?.as_str()?.to_string();
            let result = if method == "core.describe" {
                sample_catalog()
            } else {
                handler(&method, request.get("params"))
            };
            Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
        }))
        .await
    }

    pub async fn with_handler(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = commands.clone();
        let connections_clone = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_connection(
                            stream,
                            Arc::clone(&handler),
                            received_tx.clone(),
                            commands_clone.subscribe(),
                        ));
                    }
                }
            }
        });

        Self {
            addr,
            commands,
            received,
            connections,
            shutdown_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/mopidy/ws", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send a text frame to every connected client
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Push(text.into()));
    }

    /// Drop every connection without a close handshake
    pub fn disconnect_all(&self) {
        let _ = self.commands.send(ServerCommand::Disconnect);
    }

    /// Next request the server received
    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("server stopped")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    handler: Handler,
    received: mpsc::UnboundedSender<Value>,
    mut commands: broadcast::Receiver<ServerCommand>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                    let _ = received.send(request.clone());
                    if let Some(response) = handler(request) {
                        if write.send(Message::Text(response.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Ok(ServerCommand::Push(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(ServerCommand::Disconnect) | Err(_) => break,
            }
        }
    }
}
