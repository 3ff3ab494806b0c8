//! Routing of inbound messages
//!
//! Every text message from the transport ends up in [`MessageRouter::handle`].
//! Responses settle the matching pending request; server events are
//! queued as `event:<camelName>`, so no subscriber ever runs here. Anything else is logged and dropped,
//! and nothing that arrives here can fail the caller of `handle`.

use crate::events::EventQueue;
use crate::metrics::ClientMetrics;
use crate::request::RequestDispatcher;
use mopidy_core::{
    codec, snake_to_camel, Error, InboundMessage, ResponseMessage, ResponseOutcome, ServerEvent,
};
use serde_json::Value;
use std::sync::Arc;

/// Prefix of every server-pushed event name
pub const EVENT_PREFIX: &str = "event:";

#[derive(Clone)]
pub struct MessageRouter {
    dispatcher: RequestDispatcher,
    events: EventQueue,
    metrics: Option<Arc<ClientMetrics>>,
}

impl MessageRouter {
    pub fn new(dispatcher: RequestDispatcher, events: EventQueue) -> Self {
        Self {
            dispatcher,
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Route one raw inbound message
    pub async fn handle(&self, raw: &str) {
        let message = match codec::decode_inbound(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, message = %raw, "WebSocket message parsing failed");
                return;
            }
        };

        match message {
            InboundMessage::Response(response) => self.handle_response(response).await,
            InboundMessage::Event(event) => self.handle_event(event),
            InboundMessage::Unknown(value) => {
                tracing::warn!(message = %value, "Unknown message type received");
            }
        }
    }

    async fn handle_response(&self, response: ResponseMessage) {
        let Some(id) = response.id.as_request_id() else {
            tracing::warn!(message = %response.raw, "Unexpected response received");
            return;
        };

        let Some(pending) = self.dispatcher.take(id).await else {
            // Also reached when a close already rejected this request.
            tracing::warn!(id, message = %response.raw, "Unexpected response received");
            return;
        };

        let result = match response.outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(error) => {
                tracing::warn!(
                    id,
                    method = %pending.method,
                    code = error.code,
                    error = %error.message,
                    "Server returned error"
                );
                Err(Error::Server(error))
            }
            ResponseOutcome::Malformed => {
                let error = Error::MalformedResponse {
                    response: response.raw,
                };
                tracing::warn!(id, data = ?error.data(), "{}", error);
                Err(error)
            }
        };

        self.dispatcher.settle(pending, result);
    }

    fn handle_event(&self, event: ServerEvent) {
        tracing::debug!(event = %event.name, "Server event received");
        if let Some(ref metrics) = self.metrics {
            metrics.record_event(&event.name);
        }

        let name = format!("{}{}", EVENT_PREFIX, snake_to_camel(&event.name));
        self.events.push(name, Value::Object(event.fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::request::TransportSlot;
    use crate::transport::{ReadyState, Transport};
    use mopidy_core::Result;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::RwLock;

    struct OpenTransport;

    impl Transport for OpenTransport {
        fn ready_state(&self) -> ReadyState {
            ReadyState::Open
        }

        fn send(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn router_with(hub: EventHub) -> (MessageRouter, RequestDispatcher, EventQueue) {
        let slot: TransportSlot = Arc::new(RwLock::new(Some(
            Arc::new(OpenTransport) as Arc<dyn Transport>
        )));
        let events = EventQueue::spawn(hub);
        let dispatcher = RequestDispatcher::new(slot, events.clone());
        (
            MessageRouter::new(dispatcher.clone(), events.clone()),
            dispatcher,
            events,
        )
    }

    fn router() -> (MessageRouter, RequestDispatcher, EventQueue) {
        router_with(EventHub::new())
    }

    fn spawn_call(
        dispatcher: &RequestDispatcher,
    ) -> tokio::task::JoinHandle<mopidy_core::Result<Value>> {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send("core.playback.get_state", None).await })
    }

    async fn wait_for_pending(dispatcher: &RequestDispatcher, count: usize) {
        while dispatcher.pending_count().await < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_result_null_resolves() {
        let (router, dispatcher, _events) = router();
        let call = spawn_call(&dispatcher);
        wait_for_pending(&dispatcher, 1).await;

        router
            .handle(r#"{"jsonrpc":"2.0","id":0,"result":null}"#)
            .await;
        assert_eq!(call.await.unwrap().unwrap(), Value::Null);
        assert_eq!(dispatcher.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_error_keeps_absent_data_absent() {
        let (router, dispatcher, _events) = router();
        let call = spawn_call(&dispatcher);
        wait_for_pending(&dispatcher, 1).await;

        router
            .handle(r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32601,"message":"Method not found"}}"#)
            .await;

        let err = call.await.unwrap().unwrap_err();
        match err {
            Error::Server(ref data) => {
                assert_eq!(data.code, -32601);
                assert_eq!(data.message, "Method not found");
                assert_eq!(data.data, None);
            }
            other => panic!("Expected server error, got {:?}", other),
        }
        assert_eq!(err.to_string(), "Method not found");
    }

    #[tokio::test]
    async fn test_malformed_response_embeds_full_message() {
        let (router, dispatcher, _events) = router();
        let call = spawn_call(&dispatcher);
        wait_for_pending(&dispatcher, 1).await;

        router.handle(r#"{"jsonrpc":"2.0","id":0}"#).await;

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Response without 'result' or 'error' received"
        );
        assert_eq!(
            err.data(),
            Some(json!({"response": {"jsonrpc": "2.0", "id": 0}}))
        );
    }

    #[tokio::test]
    async fn test_unmatched_and_garbage_messages_are_dropped() {
        let (router, dispatcher, _events) = router();
        let call = spawn_call(&dispatcher);
        wait_for_pending(&dispatcher, 1).await;

        router.handle(r#"{"jsonrpc":"2.0","id":41,"result":1}"#).await;
        router.handle(r#"{"jsonrpc":"2.0","id":"0","result":1}"#).await;
        router.handle("not json at all").await;
        router.handle(r#"{"jsonrpc":"2.0","method":"ping"}"#).await;
        router.handle("[1,2,3]").await;

        assert_eq!(dispatcher.pending_count().await, 1);
        router.handle(r#"{"jsonrpc":"2.0","id":0,"result":"playing"}"#).await;
        assert_eq!(call.await.unwrap().unwrap(), json!("playing"));
    }

    #[tokio::test]
    async fn test_server_event_is_emitted_camel_cased_without_event_key() {
        let hub = EventHub::new();
        let received = Arc::new(StdMutex::new(Vec::new()));

        let received_clone = Arc::clone(&received);
        hub.on("event:*", move |event| {
            let received = Arc::clone(&received_clone);
            async move { received.lock().unwrap().push(event) }
        })
        .await;

        let (router, _dispatcher, events) = router_with(hub);
        router
            .handle(r#"{"event":"track_playback_started","tl_track":{"tlid":3}}"#)
            .await;
        events.flush().await;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].name, "event:trackPlaybackStarted");
        assert_eq!(received[0].payload, json!({"tl_track": {"tlid": 3}}));
    }
}
