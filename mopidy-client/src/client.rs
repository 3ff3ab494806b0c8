//! Mopidy client: connection management and the public surface
//!
//! # Architecture
//!
//! ```text
//! Transport ──signals──▶ signal loop ──push──▶ EventQueue ──▶ subscribers
//!                            │
//!                            ├─ Opened         → reset backoff, fetch core.describe
//!                            ├─ Closed         → reject pending, go offline
//!                            ├─ Errored        → log
//!                            ├─ Message        → MessageRouter
//!                            └─ CatalogFetched → install API tree, go online
//!
//! "state:offline" ──▶ reconnect hook ──▶ timer ──▶ connect()
//! ```
//!
//! Transport signals from every connection attempt go through one queue
//! and are handled one at a time. The loop never runs a subscriber: events
//! are pushed onto an [`EventQueue`] and delivered in order by a task of
//! their own. Subscribers may therefore await API calls; while they do,
//! later events wait but responses keep flowing.
//!
//! The result of `core.describe` is installed by the signal loop too, and
//! only if the connection it was fetched on is still the open one. A close
//! that overtakes the catalog leaves the client offline.
//!
//! # Reconnection
//!
//! Every `state:offline` schedules one attempt after the current backoff
//! delay and then grows the delay (doubling by default, capped at the
//! maximum). The delay goes back to the minimum as soon as a transport
//! reports that it opened. [`MopidyClient::close`] turns this off for good:
//! no further attempts are scheduled for that client.

use crate::api::{parse_catalog, ApiTree, MethodCatalog, SendFn};
use crate::client_builder::{ClientBuilder, ConnectionSettings};
use crate::connection_state::{ConnectionState, ConnectionTracker};
use crate::events::{
    Event, EventHub, EventQueue, SubscriptionId, RECONNECTING, RECONNECTION_PENDING, STATE,
    STATE_OFFLINE, STATE_ONLINE, WEBSOCKET_CLOSE, WEBSOCKET_ERROR, WEBSOCKET_INCOMING_MESSAGE,
    WEBSOCKET_OPEN,
};
use crate::metrics::ClientMetrics;
use crate::reconnect::ExponentialBackoff;
use crate::request::{RequestDispatcher, TransportSlot};
use crate::router::MessageRouter;
use crate::transport::{
    ReadyState, TransportFactory, TransportFailure, TransportSignal, TransportSignals,
};
use mopidy_core::{CloseInfo, Error, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Method returning the server's method catalog.
pub const DESCRIBE_METHOD: &str = "core.describe";

/// Handle to a Mopidy server connection
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct MopidyClient {
    inner: Arc<Inner>,
}

/// Work for the signal loop, tagged with the connection attempt it belongs to
#[derive(Debug)]
enum ClientSignal {
    Transport {
        generation: u64,
        signal: TransportSignal,
    },
    CatalogFetched {
        generation: u64,
        catalog: MethodCatalog,
    },
}

struct Inner {
    settings: ConnectionSettings,
    factory: Arc<dyn TransportFactory>,
    hub: EventHub,
    events: EventQueue,
    transport: TransportSlot,
    dispatcher: RequestDispatcher,
    router: MessageRouter,
    api: RwLock<Arc<ApiTree>>,
    tracker: ConnectionTracker,
    backoff: Mutex<ExponentialBackoff>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    reconnect_hook: Mutex<Option<SubscriptionId>>,
    signals: mpsc::UnboundedSender<ClientSignal>,
    /// Latest connection attempt
    generation: Arc<AtomicU64>,
    /// Attempt whose transport is open, 0 when none is
    open_generation: AtomicU64,
    closed: AtomicBool,
    metrics: Option<Arc<ClientMetrics>>,
}

impl MopidyClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) async fn new(
        settings: ConnectionSettings,
        factory: Arc<dyn TransportFactory>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let hub = EventHub::new();
        let events = EventQueue::spawn(hub.clone());
        let transport: TransportSlot = Arc::new(RwLock::new(None));

        let mut dispatcher = RequestDispatcher::new(Arc::clone(&transport), events.clone());
        if let Some(ref metrics) = metrics {
            dispatcher = dispatcher.with_metrics(Arc::clone(metrics));
        }
        let mut router = MessageRouter::new(dispatcher.clone(), events.clone());
        if let Some(ref metrics) = metrics {
            router = router.with_metrics(Arc::clone(metrics));
        }

        let (signals, signal_rx) = mpsc::unbounded_channel();
        let backoff = settings.backoff();

        let inner = Arc::new(Inner {
            settings,
            factory,
            hub,
            events,
            transport,
            dispatcher,
            router,
            api: RwLock::new(Arc::new(ApiTree::default())),
            tracker: ConnectionTracker::new(),
            backoff: Mutex::new(backoff),
            reconnect_timer: Mutex::new(None),
            reconnect_hook: Mutex::new(None),
            signals,
            generation: Arc::new(AtomicU64::new(0)),
            open_generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics,
        });

        tokio::spawn(signal_loop(Arc::downgrade(&inner), signal_rx));

        let weak = Arc::downgrade(&inner);
        let hook = inner
            .hub
            .on(STATE_OFFLINE, move |_| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.schedule_reconnect().await;
                    }
                }
            })
            .await;
        *inner.reconnect_hook.lock().await = Some(hook);

        if let Some(ref metrics) = inner.metrics {
            metrics.update_connection_state(ConnectionState::Offline);
        }
        Self { inner }
    }

    /// Start a connection attempt
    ///
    /// No-op when the current transport is already open. A transport that
    /// is still connecting or closing is told to close and replaced.
    #[tracing::instrument(skip(self), fields(url = %self.inner.settings.url))]
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.inner.transport.write().await;
        if let Some(current) = slot.as_ref() {
            if current.ready_state() == ReadyState::Open {
                return Ok(());
            }
        }

        tracing::info!("Connecting to server");
        self.inner.set_state(ConnectionState::Connecting);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(current) = slot.as_ref() {
            current.close();
        }

        let (signals, transport_rx) = TransportSignals::channel();
        tokio::spawn(forward_signals(
            generation,
            Arc::clone(&self.inner.generation),
            transport_rx,
            self.inner.signals.clone(),
        ));

        match self.inner.factory.create(&self.inner.settings.url, signals) {
            Ok(transport) => {
                *slot = Some(transport);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create transport");
                self.inner.set_state(ConnectionState::Offline);
                Err(e)
            }
        }
    }

    /// Close the connection and stop reconnecting
    ///
    /// Pending requests are rejected once the transport reports the close.
    /// A later [`connect`](Self::connect) works, but is never retried.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let hook = self.inner.reconnect_hook.lock().await.take();
        if let Some(id) = hook {
            self.inner.hub.off(id).await;
        }
        if let Some(timer) = self.inner.reconnect_timer.lock().await.take() {
            timer.abort();
        }

        tracing::info!("Closing connection");
        if let Some(transport) = self.inner.transport.read().await.as_ref() {
            transport.close();
        }
    }

    /// Subscribe to an event name, a `prefix:*` wildcard, or `*`
    pub async fn on<F, Fut>(&self, key: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.hub.on(key, handler).await
    }

    pub async fn on_any<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.hub.on_any(handler).await
    }

    pub async fn off(&self, id: SubscriptionId) -> bool {
        self.inner.hub.off(id).await
    }

    pub fn events(&self) -> &EventHub {
        &self.inner.hub
    }

    /// Resolves once every event emitted so far has reached its subscribers
    ///
    /// Must not be awaited from inside a subscriber.
    pub async fn flush_events(&self) {
        self.inner.events.flush().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.tracker.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.tracker.subscribe()
    }

    /// Resolves once the API tree has been built for the current connection
    pub async fn wait_until_online(&self) {
        self.inner.tracker.wait_for(ConnectionState::Online).await;
    }

    /// Ready state of the current transport, if one was created
    pub async fn ready_state(&self) -> Option<ReadyState> {
        self.inner
            .transport
            .read()
            .await
            .as_ref()
            .map(|t| t.ready_state())
    }

    /// The API tree from the latest successful `core.describe`
    ///
    /// Empty until the client first goes online.
    pub async fn api(&self) -> Arc<ApiTree> {
        Arc::clone(&*self.inner.api.read().await)
    }

    /// Call the API method at a camel-case dotted path, e.g. `playback.getState`
    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.api().await.call(path, args).await
    }

    /// Send a raw request, bypassing the API tree
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.inner.dispatcher.send(method, params).await
    }

    pub async fn pending_requests(&self) -> usize {
        self.inner.dispatcher.pending_count().await
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }
}

/// Forward one transport's signals into the client queue
///
/// Once a newer connection attempt has started, a transport that never
/// opened is of no interest: nothing can be pending on it, and its close
/// must not take the client offline. Its remaining signals are dropped.
async fn forward_signals(
    generation: u64,
    current: Arc<AtomicU64>,
    mut transport: mpsc::UnboundedReceiver<TransportSignal>,
    queue: mpsc::UnboundedSender<ClientSignal>,
) {
    let mut opened = false;
    while let Some(signal) = transport.recv().await {
        if !opened && current.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, signal = ?signal, "Dropping signal from a replaced transport");
            continue;
        }
        if signal == TransportSignal::Opened {
            opened = true;
        }
        if queue
            .send(ClientSignal::Transport { generation, signal })
            .is_err()
        {
            break;
        }
    }
}

async fn signal_loop(weak: Weak<Inner>, mut signals: mpsc::UnboundedReceiver<ClientSignal>) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        inner.handle_signal(signal).await;
    }
    tracing::debug!("Signal loop stopped");
}

impl Inner {
    async fn handle_signal(self: &Arc<Self>, signal: ClientSignal) {
        match signal {
            ClientSignal::Transport { generation, signal } => match signal {
                TransportSignal::Opened => self.on_opened(generation).await,
                TransportSignal::Closed(close) => self.on_closed(generation, close).await,
                TransportSignal::Errored(failure) => self.on_errored(failure),
                TransportSignal::Message(text) => {
                    self.events
                        .push(WEBSOCKET_INCOMING_MESSAGE, Value::String(text.clone()));
                    self.router.handle(&text).await;
                }
            },
            ClientSignal::CatalogFetched {
                generation,
                catalog,
            } => self.install_api(generation, catalog).await,
        }
    }

    async fn on_opened(self: &Arc<Self>, generation: u64) {
        tracing::info!(generation, "Connected");
        self.open_generation.store(generation, Ordering::SeqCst);
        self.backoff.lock().await.reset();
        self.events.push(WEBSOCKET_OPEN, Value::Null);

        // The describe response arrives through this same loop.
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.fetch_catalog(generation).await });
    }

    async fn on_closed(&self, generation: u64, close: CloseInfo) {
        tracing::info!(code = close.code, reason = %close.reason, "Connection closed");
        let _ = self.open_generation.compare_exchange(
            generation,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.events.push(
            WEBSOCKET_CLOSE,
            serde_json::to_value(&close).unwrap_or_default(),
        );

        self.dispatcher
            .reject_all(Error::websocket_closed(close))
            .await;

        self.set_state(ConnectionState::Offline);
        self.events.push(STATE, json!(STATE_OFFLINE));
        self.events.push(STATE_OFFLINE, Value::Null);
    }

    fn on_errored(&self, failure: TransportFailure) {
        self.events.push(
            WEBSOCKET_ERROR,
            serde_json::to_value(&failure).unwrap_or_default(),
        );
        tracing::warn!(error = %failure.diagnostic(), "WebSocket error");
        if let Some(ref metrics) = self.metrics {
            metrics.record_error("connection");
        }
    }

    async fn fetch_catalog(&self, generation: u64) {
        let catalog = match self.dispatcher.send(DESCRIBE_METHOD, None).await {
            Ok(value) => parse_catalog(value),
            Err(e) => Err(e),
        };
        match catalog {
            Ok(catalog) => {
                let _ = self.signals.send(ClientSignal::CatalogFetched {
                    generation,
                    catalog,
                });
            }
            Err(e) => tracing::warn!(generation, error = %e, "Failed to fetch API catalog"),
        }
    }

    async fn install_api(&self, generation: u64, catalog: MethodCatalog) {
        let live = self.open_generation.load(Ordering::SeqCst) == generation;
        let open = self
            .transport
            .read()
            .await
            .as_ref()
            .map(|t| t.ready_state())
            == Some(ReadyState::Open);
        if !live || !open {
            tracing::debug!(generation, "Discarding API catalog of a closed connection");
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let send: SendFn = Arc::new(move |method, params| {
            let dispatcher = dispatcher.clone();
            Box::pin(async move { dispatcher.send(&method, params).await })
        });
        let tree = ApiTree::build(
            &catalog,
            self.settings.calling_convention,
            self.settings.method_naming,
            send,
        );
        *self.api.write().await = Arc::new(tree);

        self.set_state(ConnectionState::Online);
        self.events.push(STATE, json!(STATE_ONLINE));
        self.events.push(STATE_ONLINE, Value::Null);
    }

    async fn schedule_reconnect(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("Client closed, not reconnecting");
            return;
        }

        let delay = self.backoff.lock().await.next_delay();
        if let Some(ref metrics) = self.metrics {
            metrics.record_reconnection_attempt();
        }
        tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnection scheduled");

        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            inner.events.push(
                RECONNECTION_PENDING,
                json!({ "timeToAttempt": delay.as_millis() as u64 }),
            );
            drop(inner);

            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            inner.events.push(RECONNECTING, Value::Null);
            let client = MopidyClient { inner };
            if let Err(e) = client.connect().await {
                tracing::warn!(error = %e, "Reconnection attempt failed");
            }
        });

        let mut slot = self.reconnect_timer.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            timer.abort();
            return;
        }
        // Only one attempt is ever scheduled.
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if self.tracker.set(state) {
            if let Some(ref metrics) = self.metrics {
                metrics.update_connection_state(state);
            }
        }
    }
}
