//! Live racing telemetry over a publish/subscribe transport.
//!
//! This crate owns the connection lifecycle and the derived data a UI
//! needs from a telemetry publisher:
//!
//! - **[`TelemetryClient`]**: Public facade. [`connect()`](TelemetryClient::connect)
//!   and [`disconnect()`](TelemetryClient::disconnect) return as soon as the
//!   transition is initiated; everything else is a read-only, observable field.
//!
//! - **[`ConnectionController`]**: The state machine
//!   (`NotConnected → Connecting → Connected → Disconnecting`). Serializes
//!   transitions behind one lock, cancels stale attempts with a per-attempt
//!   `CancellationToken`, and never retries on its own.
//!
//! - **[`TelemetryState`]**: Copy-on-write [`TelemetrySnapshot`] publication
//!   via `ArcSwap`. Malformed updates leave the last good snapshot in place.
//!
//! - **[`MetricsCollector`]**: Lock-free counters with one-second rate
//!   buckets over a trailing window.
//!
//! - **[`RefreshPolicy`]**: Advisory cadence: tracks the inbound rate while
//!   updates flow, backs off exponentially while idle.
//!
//! - **[`Transport`]**: The seam to the actual pub/sub implementation,
//!   which reports back through an [`EventSink`].

pub mod client;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod model;
pub mod refresh;
pub mod store;
pub mod stream;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::TelemetryClient;
pub use config::{ClientConfig, MetricsConfig, ServerIdentity};
pub use controller::{ConnectionController, ConnectionState, StateTransition};
pub use error::{ConnectionError, CoreError, DecodeError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use refresh::{RefreshInterval, RefreshPolicy, RefreshPolicyConfig};
pub use store::TelemetryState;
pub use stream::{FieldStream, Observable, Subscription, TelemetryStream};
pub use transport::{EventSink, Transport, TransportError, TransportEvent};

pub use model::{PublisherMetric, PublisherMetrics, TelemetrySnapshot, TelemetryTopic};
