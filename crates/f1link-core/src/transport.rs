//! The seam between the controller and a pub/sub transport.
//!
//! The transport is an opaque collaborator: it knows how to open a session,
//! subscribe to a topic tree and close it again. Everything it observes is
//! reported back through an [`EventSink`] from whatever task or thread the
//! transport delivers on.
//!
//! All [`Transport`] methods only *initiate* work and must return promptly;
//! completion is reported as a [`TransportEvent`].

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ServerIdentity;

/// Failure returned synchronously by a transport's initiating calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Something the transport observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The session requested by `connect` is open.
    Connected,
    /// The session requested by `connect` could not be opened.
    ConnectFailed { reason: String },
    /// An open session ended without being asked to.
    Dropped { reason: String },
    /// A value arrived on a subscribed topic.
    TopicUpdate { topic: String, payload: Bytes },
}

impl TransportEvent {
    pub fn topic_update(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::TopicUpdate {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Delivery handle for one connection attempt.
///
/// Cheap to clone. Once the attempt it belongs to is cancelled (by
/// `disconnect()` or a failure), sends are silently dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn new(attempt: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { attempt, tx }
    }

    /// Deliver an event. Returns `false` if the attempt is no longer live.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Identifier of the connection attempt this sink reports for.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Whether the controller has stopped listening to this attempt.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A pub/sub transport the controller can drive.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a session to `identity`. Outcome is reported as
    /// [`TransportEvent::Connected`] or [`TransportEvent::ConnectFailed`].
    fn connect(&self, identity: &ServerIdentity, sink: EventSink) -> Result<(), TransportError>;

    /// Subscribe to every topic below `topic_path`.
    fn subscribe(&self, topic_path: &str) -> Result<(), TransportError>;

    /// Close the current session (or abandon an in-flight connect).
    fn disconnect(&self);
}
