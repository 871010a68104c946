// Scripted in-memory transport shared by the integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use f1link_core::{
    EventSink, ServerIdentity, TelemetryClient, Transport, TransportError, TransportEvent,
};

pub const ENDPOINT: &str = "wss://example/test";
pub const ROOT: &str = "/cars";

#[derive(Default)]
struct MockState {
    sinks: Vec<EventSink>,
    identities: Vec<ServerIdentity>,
    subscriptions: Vec<String>,
    disconnects: usize,
    fail_connect: Option<TransportError>,
    fail_subscribe: Option<TransportError>,
    panic_on_subscribe: bool,
}

/// Records every call and lets the test play the transport's side.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `connect()` call fail synchronously.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.state.lock().unwrap().fail_connect = Some(error);
    }

    /// Make every `subscribe()` call fail.
    pub fn fail_subscribe(&self, error: TransportError) {
        self.state.lock().unwrap().fail_subscribe = Some(error);
    }

    /// Make every `subscribe()` call panic on the caller's task.
    pub fn panic_on_subscribe(&self) {
        self.state.lock().unwrap().panic_on_subscribe = true;
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().identities.len()
    }

    pub fn last_identity(&self) -> Option<ServerIdentity> {
        self.state.lock().unwrap().identities.last().cloned()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Sink handed over by the most recent `connect()`.
    pub fn sink(&self) -> EventSink {
        self.state.lock().unwrap().sinks.last().cloned().unwrap()
    }

    /// Deliver an event on the most recent attempt's sink.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sink = self.state.lock().unwrap().sinks.last().cloned();
        sink.is_some_and(|sink| sink.send(event))
    }

    pub fn establish(&self) -> bool {
        self.emit(TransportEvent::Connected)
    }

    pub fn publish(&self, topic: &str, payload: &'static str) -> bool {
        self.emit(TransportEvent::topic_update(topic.to_owned(), payload))
    }
}

impl Transport for MockTransport {
    fn connect(&self, identity: &ServerIdentity, sink: EventSink) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.identities.push(identity.clone());
        if let Some(error) = state.fail_connect.take() {
            return Err(error);
        }
        state.sinks.push(sink);
        Ok(())
    }

    fn subscribe(&self, topic_path: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.panic_on_subscribe {
            drop(state);
            panic!("subscribe failed hard");
        }
        if let Some(error) = state.fail_subscribe.clone() {
            return Err(error);
        }
        state.subscriptions.push(topic_path.to_owned());
        Ok(())
    }

    fn disconnect(&self) {
        self.state.lock().unwrap().disconnects += 1;
    }
}

pub fn client(transport: &Arc<MockTransport>) -> TelemetryClient {
    TelemetryClient::with_endpoint(ENDPOINT, ROOT, transport.clone()).unwrap()
}

/// Let spawned controller tasks drain their queues.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}
