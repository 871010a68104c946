// ── Client facade ──
//
// The read-only public surface over a `ConnectionController`. The only
// mutation paths are `connect()`, `disconnect()` and the transport's own
// topic updates.

use std::sync::Arc;

use tokio::sync::broadcast;
use url::Url;

use crate::config::{ClientConfig, ServerIdentity};
use crate::controller::{ConnectionController, ConnectionState, StateTransition};
use crate::error::{ConnectionError, CoreError};
use crate::metrics::MetricsSnapshot;
use crate::model::TelemetrySnapshot;
use crate::refresh::RefreshInterval;
use crate::stream::{FieldStream, TelemetryStream};
use crate::transport::Transport;

/// A telemetry subscriber bound to one server identity.
///
/// Dropping the client cancels its background tasks and closes the
/// transport session.
pub struct TelemetryClient {
    controller: ConnectionController,
}

impl TelemetryClient {
    /// Build a client. Fails if the configuration does not validate;
    /// the transport is not touched until [`connect()`](Self::connect).
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        let controller = ConnectionController::new(config, transport)?;
        Ok(Self { controller })
    }

    /// Shorthand for a default configuration around `endpoint` and `root_topic_path`.
    pub fn with_endpoint(
        endpoint: &str,
        root_topic_path: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoreError> {
        let identity = ServerIdentity::new(endpoint, root_topic_path)?;
        Self::new(ClientConfig::new(identity), transport)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// See [`ConnectionController::connect`].
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.controller.connect().await
    }

    /// See [`ConnectionController::disconnect`].
    pub async fn disconnect(&self) {
        self.controller.disconnect().await;
    }

    // ── Connection ───────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn watch_state(&self) -> FieldStream<ConnectionState> {
        self.controller.watch_state()
    }

    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.controller.subscribe_transitions()
    }

    pub fn server_url(&self) -> &Url {
        self.controller.identity().endpoint()
    }

    pub fn root_topic_path(&self) -> &str {
        self.controller.identity().root_topic_path()
    }

    /// The most recent transport failure, cleared by the next `connect()`.
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.controller.last_error()
    }

    pub fn watch_last_error(&self) -> FieldStream<Option<ConnectionError>> {
        self.controller.watch_last_error()
    }

    // ── Telemetry ────────────────────────────────────────────────

    pub fn telemetry(&self) -> Arc<TelemetrySnapshot> {
        self.controller.telemetry()
    }

    pub fn watch_telemetry(&self) -> TelemetryStream {
        self.controller.watch_telemetry()
    }

    pub fn steering(&self) -> f64 {
        self.telemetry().steering
    }

    pub fn braking(&self) -> f64 {
        self.telemetry().braking
    }

    pub fn acceleration(&self) -> f64 {
        self.telemetry().acceleration
    }

    pub fn gear(&self) -> u32 {
        self.telemetry().gear
    }

    pub fn button_states(&self) -> Vec<bool> {
        self.telemetry().button_states().to_vec()
    }

    pub fn button_names(&self) -> Vec<String> {
        self.telemetry().button_names().to_vec()
    }

    // ── Cadence and metrics ──────────────────────────────────────

    pub fn refresh_interval(&self) -> RefreshInterval {
        self.controller.refresh_interval()
    }

    pub fn watch_refresh_interval(&self) -> FieldStream<RefreshInterval> {
        self.controller.watch_refresh_interval()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.controller.metrics()
    }

    pub fn watch_metrics(&self) -> FieldStream<MetricsSnapshot> {
        self.controller.watch_metrics()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}
