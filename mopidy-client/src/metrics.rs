//! Client metrics
//!
//! OpenTelemetry instruments describing connection health and call
//! traffic. They are only created when observability is enabled through
//! [`ClientBuilder::with_observability`](crate::ClientBuilder::with_observability);
//! export is handled by whatever meter provider the application installed.
//!
//! # Metrics Collected
//!
//! - **mopidy.client.connection.state**: 0 offline, 1 connecting, 2 online (gauge)
//! - **mopidy.client.requests.total**: requests handed to the transport, by method
//! - **mopidy.client.responses.total**: settled requests, by outcome
//! - **mopidy.client.request.duration**: time from send to settlement (histogram)
//! - **mopidy.client.errors.total**: failures, by error kind
//! - **mopidy.client.reconnection.attempts**: scheduled reconnection attempts
//! - **mopidy.client.events.received**: server-pushed events, by event name

use crate::connection_state::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

pub struct ClientMetrics {
    pub connection_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    pub responses_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub events_received: Counter<u64>,
}

impl ClientMetrics {
    /// Instruments on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        // The global meter API wants a 'static name; one leak per client.
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        Self::new_with_meter(&global::meter(name))
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("mopidy.client.connection.state")
                .with_description("Connection state (0=offline, 1=connecting, 2=online)")
                .build(),
            requests_total: meter
                .u64_counter("mopidy.client.requests.total")
                .with_description("Requests handed to the transport")
                .build(),
            responses_total: meter
                .u64_counter("mopidy.client.responses.total")
                .with_description("Requests settled, by outcome")
                .build(),
            request_duration: meter
                .f64_histogram("mopidy.client.request.duration")
                .with_description("Seconds from send to settlement")
                .build(),
            errors_total: meter
                .u64_counter("mopidy.client.errors.total")
                .with_description("Errors encountered, by kind")
                .build(),
            reconnection_attempts: meter
                .u64_counter("mopidy.client.reconnection.attempts")
                .with_description("Reconnection attempts scheduled")
                .build(),
            events_received: meter
                .u64_counter("mopidy.client.events.received")
                .with_description("Server-pushed events received")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_gauge(), &[]);
    }

    pub fn record_request(&self, method: &str) {
        self.requests_total
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// `outcome` is `"result"`, or the error kind label for failures
    pub fn record_response(&self, method: &str, outcome: &'static str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("outcome", outcome),
        ];
        self.responses_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors_total.add(1, &[KeyValue::new("kind", kind)]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_event(&self, event: &str) {
        self.events_received
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }
}
