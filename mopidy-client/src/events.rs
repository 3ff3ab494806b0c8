//! Publish/subscribe hub for client and server events
//!
//! Every observable thing the client does goes through one [`EventHub`]:
//! transport lifecycle (`websocket:*`), connection state (`state`,
//! `state:online`, `state:offline`), reconnection progress
//! (`reconnectionPending`, `reconnecting`) and server-pushed events
//! (`event:<camelName>`).
//!
//! # Subscription keys
//!
//! - an exact event name, e.g. `"state:online"`
//! - a prefix wildcard ending in `:*`, e.g. `"event:*"` matches every
//!   server event
//! - [`ALL_EVENTS`] (`"*"`), which matches everything
//!
//! Handlers receive an [`Event`] carrying both the concrete name and the
//! payload, so wildcard handlers can tell events apart.
//!
//! # Emission
//!
//! `emit` snapshots the matching handlers, releases the registry lock and
//! then awaits each handler in turn. Handlers may therefore subscribe,
//! unsubscribe or emit from inside a handler; changes apply to the next
//! emission, not the one in progress.
//!
//! The client itself never calls `emit` directly. It pushes onto an
//! [`EventQueue`], whose task does the emitting, so nothing that settles
//! responses or tracks the connection waits on a subscriber.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Reserved subscription key matching every event.
pub const ALL_EVENTS: &str = "*";

pub const WEBSOCKET_OPEN: &str = "websocket:open";
pub const WEBSOCKET_CLOSE: &str = "websocket:close";
pub const WEBSOCKET_ERROR: &str = "websocket:error";
pub const WEBSOCKET_INCOMING_MESSAGE: &str = "websocket:incomingMessage";
pub const WEBSOCKET_OUTGOING_MESSAGE: &str = "websocket:outgoingMessage";
/// Carries `"state:online"` or `"state:offline"` as its payload
pub const STATE: &str = "state";
pub const STATE_ONLINE: &str = "state:online";
pub const STATE_OFFLINE: &str = "state:offline";
/// Payload `{"timeToAttempt": <milliseconds>}`
pub const RECONNECTION_PENDING: &str = "reconnectionPending";
pub const RECONNECTING: &str = "reconnecting";

/// An emitted event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// Identifies one subscription, for [`EventHub::off`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type EventFn = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EventPattern {
    All,
    Prefix(String),
    Exact(String),
}

impl EventPattern {
    fn parse(key: &str) -> Self {
        if key == ALL_EVENTS {
            EventPattern::All
        } else if let Some(prefix) = key.strip_suffix('*').filter(|p| p.ends_with(':')) {
            EventPattern::Prefix(prefix.to_string())
        } else {
            EventPattern::Exact(key.to_string())
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            EventPattern::All => true,
            EventPattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
            EventPattern::Exact(exact) => exact == name,
        }
    }

    /// Exact handlers run first, then prefix wildcards, then catch-alls.
    fn rank(&self) -> u8 {
        match self {
            EventPattern::Exact(_) => 0,
            EventPattern::Prefix(_) => 1,
            EventPattern::All => 2,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    pattern: EventPattern,
    handler: EventFn,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    // Keyed by the subscription key as given, in registration order per key.
    by_key: HashMap<String, Vec<Subscription>>,
}

/// Registry of event subscribers
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to the events matched by `key`
    pub async fn on<F, Fut>(&self, key: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let handler: EventFn = Arc::new(move |event| Box::pin(handler(event)));

        let mut registry = self.registry.lock().await;
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        let pattern = EventPattern::parse(&key);
        registry.by_key.entry(key).or_default().push(Subscription {
            id,
            pattern,
            handler,
        });
        id
    }

    /// Subscribe to every event
    pub async fn on_any<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(ALL_EVENTS, handler).await
    }

    /// Remove one subscription; returns whether it existed
    pub async fn off(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock().await;
        let mut removed = false;
        registry.by_key.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    /// Remove every subscription registered under exactly `key`
    pub async fn off_all(&self, key: &str) -> usize {
        self.registry
            .lock()
            .await
            .by_key
            .remove(key)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Deliver one event to every matching subscriber
    pub async fn emit(&self, name: impl Into<String>, payload: Value) {
        let name = name.into();
        let handlers = self.snapshot(&name).await;

        if handlers.is_empty() {
            tracing::trace!(event = %name, "No subscribers for event");
            return;
        }

        let event = Event { name, payload };
        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    /// Number of subscribers an emission of `name` would reach
    pub async fn handler_count(&self, name: &str) -> usize {
        self.snapshot(name).await.len()
    }

    async fn snapshot(&self, name: &str) -> Vec<EventFn> {
        let registry = self.registry.lock().await;
        let mut matching: Vec<(u8, SubscriptionId, EventFn)> = registry
            .by_key
            .values()
            .flatten()
            .filter(|s| s.pattern.matches(name))
            .map(|s| (s.pattern.rank(), s.id, Arc::clone(&s.handler)))
            .collect();
        drop(registry);

        // Ids are allocated monotonically, so they order by registration.
        matching.sort_by_key(|(rank, id, _)| (*rank, *id));
        matching.into_iter().map(|(_, _, handler)| handler).collect()
    }
}

enum Delivery {
    Event(Event),
    Flush(oneshot::Sender<()>),
}

/// Ordered, non-blocking front of an [`EventHub`]
///
/// `push` never waits. Events go into a queue drained by one task, which
/// awaits every subscriber of an event before taking the next one, so the
/// order of pushes is the order of delivery. A subscriber that awaits a
/// request therefore holds up later events, never the response it waits
/// for.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl EventQueue {
    /// Start the delivery task for `hub`
    ///
    /// The task stops once every clone of the queue is dropped.
    pub fn spawn(hub: EventHub) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Event(event) => hub.emit(event.name, event.payload).await,
                    Delivery::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Event delivery stopped");
        });
        Self { tx }
    }

    pub fn push(&self, name: impl Into<String>, payload: Value) {
        let event = Event {
            name: name.into(),
            payload,
        };
        if self.tx.send(Delivery::Event(event)).is_err() {
            tracing::trace!("Event queue closed, event dropped");
        }
    }

    /// Resolves once everything pushed before this call has been delivered
    ///
    /// Awaiting this from inside a subscriber never resolves.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Delivery::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
