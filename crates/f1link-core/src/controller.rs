// ── Connection controller ──
//
// Owns the connection state machine. Drives the transport through
// connect/subscribe/disconnect, turns inbound topic updates into telemetry
// snapshots and metrics, and keeps the advisory refresh interval current.
//
// Every state transition happens while holding the session lock. Topic
// updates take the lock-free path: they only read the state and the
// attempt's cancellation token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::{ClientConfig, ServerIdentity};
use crate::error::{ConnectionError, CoreError};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::model::TelemetrySnapshot;
use crate::refresh::{RefreshInput, RefreshInterval, RefreshPolicy};
use crate::store::TelemetryState;
use crate::stream::{FieldStream, Observable, TelemetryStream};
use crate::transport::{EventSink, Transport, TransportEvent};

const TRANSITION_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
)]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnecting, NotConnected};
        matches!(
            (self, next),
            (NotConnected, Connecting)
                | (Connecting, Connected | NotConnected | Disconnecting)
                | (Connected, Disconnecting | NotConnected)
                | (Disconnecting, NotConnected)
        )
    }

    /// Connecting or Connected.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// One observed edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    /// Connection attempt the transition belongs to.
    pub attempt: u64,
}

// ── Controller ───────────────────────────────────────────────────

/// The engine behind [`TelemetryClient`](crate::TelemetryClient).
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Background tasks hold
/// clones until [`shutdown()`](Self::shutdown) cancels them.
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: Observable<ConnectionState>,
    last_error: Observable<Option<ConnectionError>>,
    refresh_interval: Observable<RefreshInterval>,
    /// Republished by the housekeeping tick and after each update.
    metrics_feed: Observable<MetricsSnapshot>,
    telemetry: TelemetryState,
    metrics: MetricsCollector,
    policy: Mutex<RefreshPolicy>,
    session: Mutex<Session>,
    transitions: broadcast::Sender<StateTransition>,
    cancel: CancellationToken,
}

/// Bookkeeping for the current connection attempt.
struct Session {
    attempt: u64,
    /// Child of the root token, replaced on every connect.
    cancel: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
    housekeeping: Option<JoinHandle<()>>,
}

impl Session {
    fn is_current(&self, attempt: u64) -> bool {
        self.attempt == attempt && !self.cancel.is_cancelled()
    }
}

impl ConnectionController {
    /// Create a controller. Does NOT connect and spawns nothing.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        config.validate()?;

        let policy = RefreshPolicy::new(config.refresh.clone());
        let metrics = MetricsCollector::new(&config.metrics);
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let session = Session {
            attempt: 0,
            cancel: cancel.child_token(),
            dispatcher: None,
            housekeeping: None,
        };

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                transport,
                state: Observable::new(ConnectionState::NotConnected),
                last_error: Observable::new(None),
                refresh_interval: Observable::new(policy.current()),
                metrics_feed: Observable::new(metrics.snapshot()),
                telemetry: TelemetryState::new(),
                metrics,
                policy: Mutex::new(policy),
                session: Mutex::new(session),
                transitions,
                cancel,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.inner.config.identity
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start connecting.
    ///
    /// Returns as soon as the attempt is initiated; the outcome is observed
    /// through [`state()`](Self::state) and [`last_error()`](Self::last_error).
    /// A no-op while already Connecting or Connected. Rejected with
    /// [`CoreError::Disconnecting`] while a disconnect is being torn down.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut session = self.inner.session.lock().await;

        match self.inner.state.get() {
            state @ (ConnectionState::Connecting | ConnectionState::Connected) => {
                debug!(%state, attempt = session.attempt, "connect requested while active");
                return Ok(());
            }
            ConnectionState::Disconnecting => return Err(CoreError::Disconnecting),
            ConnectionState::NotConnected => {}
        }
        if self.inner.cancel.is_cancelled() {
            debug!("connect requested after shutdown");
            return Ok(());
        }

        self.ensure_housekeeping(&mut session);

        session.attempt = session.attempt.wrapping_add(1);
        let attempt = session.attempt;
        let cancel = self.inner.cancel.child_token();
        session.cancel = cancel.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.last_error.set(None);
        self.transition(&session, ConnectionState::Connecting);
        info!(attempt, endpoint = %self.identity().endpoint(), "connecting");

        session.dispatcher = Some(tokio::spawn(dispatch_task(
            self.clone(),
            attempt,
            rx,
            cancel,
        )));

        let identity = &self.inner.config.identity;
        if let Err(e) = self
            .inner
            .transport
            .connect(identity, EventSink::new(attempt, tx))
        {
            self.fail_attempt(&mut session, ConnectionError::refused(identity.endpoint(), &e));
        }
        drop(session);

        self.reevaluate_refresh().await;
        Ok(())
    }

    /// Tear down the current session.
    ///
    /// Moves to Disconnecting immediately, cancels the in-flight attempt and
    /// finishes the move to NotConnected in the background. A no-op unless
    /// Connecting or Connected.
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;

        let state = self.inner.state.get();
        if !state.is_active() {
            debug!(%state, "disconnect requested with no active session");
            return;
        }

        let attempt = session.attempt;
        self.transition(&session, ConnectionState::Disconnecting);
        session.cancel.cancel();
        self.inner.transport.disconnect();
        let dispatcher = session.dispatcher.take();
        drop(session);

        let controller = self.clone();
        tokio::spawn(async move { controller.finish_teardown(attempt, dispatcher).await });
    }

    /// Cancel every background task and close the transport session.
    /// Called when the owning client is dropped.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        if self.inner.state.get().is_active() {
            self.inner.transport.disconnect();
        }
        debug!("controller shut down");
    }

    async fn finish_teardown(&self, attempt: u64, dispatcher: Option<JoinHandle<()>>) {
        if let Some(handle) = dispatcher {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    warn!(attempt, error = %e, "dispatcher panicked during teardown");
                }
                Err(e) => warn!(attempt, error = %e, "dispatcher ended abnormally"),
            }
        }

        let session = self.inner.session.lock().await;
        if session.attempt == attempt && self.inner.state.get() == ConnectionState::Disconnecting {
            self.transition(&session, ConnectionState::NotConnected);
            info!(attempt, "disconnected");
        }
        drop(session);

        self.reevaluate_refresh().await;
    }

    // ── Transport events ─────────────────────────────────────────

    async fn handle_event(&self, attempt: u64, cancel: &CancellationToken, event: TransportEvent) {
        match event {
            TransportEvent::TopicUpdate { topic, payload } => {
                self.apply_update(cancel, &topic, &payload).await;
            }
            TransportEvent::Connected => self.on_connected(attempt).await,
            TransportEvent::ConnectFailed { reason } => {
                let error = ConnectionError::Refused {
                    endpoint: self.identity().endpoint().to_string(),
                    reason,
                };
                self.on_failure(attempt, error).await;
            }
            TransportEvent::Dropped { reason } => {
                self.on_failure(attempt, ConnectionError::Dropped { reason })
                    .await;
            }
        }
    }

    async fn on_connected(&self, attempt: u64) {
        let mut session = self.inner.session.lock().await;
        if !session.is_current(attempt)
            || self.inner.state.get() != ConnectionState::Connecting
        {
            debug!(attempt, "discarding stale connection-established event");
            return;
        }

        self.transition(&session, ConnectionState::Connected);
        self.inner.metrics.mark_connected();
        info!(attempt, endpoint = %self.identity().endpoint(), "connected");

        let root = self.identity().root_topic_path();
        if let Err(e) = self.inner.transport.subscribe(root) {
            self.inner.transport.disconnect();
            let error = ConnectionError::SubscribeFailed {
                topic: root.to_owned(),
                reason: e.to_string(),
            };
            self.fail_attempt(&mut session, error);
        }
        drop(session);

        self.reevaluate_refresh().await;
    }

    async fn on_failure(&self, attempt: u64, error: ConnectionError) {
        let mut session = self.inner.session.lock().await;
        if !session.is_current(attempt) || !self.inner.state.get().is_active() {
            debug!(attempt, %error, "discarding stale failure event");
            return;
        }
        self.fail_attempt(&mut session, error);
        drop(session);

        self.reevaluate_refresh().await;
    }

    /// Decode one update and publish it. Never touches the session lock.
    async fn apply_update(&self, cancel: &CancellationToken, topic: &str, payload: &[u8]) {
        if cancel.is_cancelled() || self.inner.state.get() != ConnectionState::Connected {
            trace!(topic, "ignoring update outside an open session");
            return;
        }

        let root = self.identity().root_topic_path();
        let applied = codec::decode_topic(root, topic, payload).and_then(|value| {
            self.inner.telemetry.apply(&value)?;
            Ok(value.topic())
        });

        match applied {
            Ok(resolved) => {
                self.inner.metrics.record_success();
                trace!(
                    topic = %resolved,
                    version = self.inner.telemetry.version(),
                    "telemetry updated"
                );
            }
            Err(e) => {
                self.inner.metrics.record_failure();
                warn!(topic, error = %e, "discarding topic update");
            }
        }

        self.publish_metrics();
        self.reevaluate_refresh().await;
    }

    // ── State machine helpers ────────────────────────────────────

    /// Move to `to`. Callers hold the session lock, which `session` witnesses.
    fn transition(&self, session: &Session, to: ConnectionState) {
        let from = self.inner.state.get();
        if !from.can_transition_to(to) {
            warn!(%from, %to, attempt = session.attempt, "refusing invalid state transition");
            return;
        }
        self.inner.state.set(to);
        debug!(%from, %to, attempt = session.attempt, "state transition");
        let _ = self.inner.transitions.send(StateTransition {
            from,
            to,
            attempt: session.attempt,
        });
    }

    /// End the current attempt after a transport-level failure.
    fn fail_attempt(&self, session: &mut Session, error: ConnectionError) {
        session.cancel.cancel();
        // The dispatcher sees the cancellation and exits on its own.
        drop(session.dispatcher.take());
        self.inner.metrics.record_connection_failure();
        warn!(attempt = session.attempt, %error, "connection failed");
        self.inner.last_error.set(Some(error));
        self.transition(session, ConnectionState::NotConnected);
    }

    fn ensure_housekeeping(&self, session: &mut Session) {
        if session.housekeeping.is_none() {
            session.housekeeping = Some(tokio::spawn(housekeeping_task(
                self.clone(),
                self.inner.config.tick_interval,
                self.inner.cancel.clone(),
            )));
        }
    }

    fn publish_metrics(&self) {
        self.inner.metrics_feed.set(self.inner.metrics.snapshot());
    }

    async fn reevaluate_refresh(&self) {
        let now = Instant::now();
        let input = RefreshInput {
            state: self.inner.state.get(),
            updates_per_second: self.inner.metrics.snapshot_at(now).rate_of_updates_per_second,
            since_last_update: self.inner.metrics.last_update_age(now),
        };
        let interval = self.inner.policy.lock().await.evaluate(&input);
        if self.inner.refresh_interval.set(interval) {
            debug!(
                frequency = interval.frequency,
                sleep_ms = interval.sleep_duration,
                "refresh interval changed"
            );
        }
    }

    // ── State observation ────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn watch_state(&self) -> FieldStream<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Every transition as it happens, including ones a `watch_state()`
    /// subscriber would see coalesced.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.transitions.subscribe()
    }

    pub fn last_error(&self) -> Option<ConnectionError> {
        self.inner.last_error.get()
    }

    pub fn watch_last_error(&self) -> FieldStream<Option<ConnectionError>> {
        self.inner.last_error.subscribe()
    }

    pub fn telemetry(&self) -> Arc<TelemetrySnapshot> {
        self.inner.telemetry.snapshot()
    }

    pub fn watch_telemetry(&self) -> TelemetryStream {
        self.inner.telemetry.subscribe()
    }

    pub fn refresh_interval(&self) -> RefreshInterval {
        self.inner.refresh_interval.get()
    }

    pub fn watch_refresh_interval(&self) -> FieldStream<RefreshInterval> {
        self.inner.refresh_interval.subscribe()
    }

    /// Metrics computed at the time of the call.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn watch_metrics(&self) -> FieldStream<MetricsSnapshot> {
        self.inner.metrics_feed.subscribe()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Feeds one attempt's transport events into the controller, in order.
async fn dispatch_task(
    controller: ConnectionController,
    attempt: u64,
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => controller.handle_event(attempt, &cancel, event).await,
                None => break,
            },
        }
    }
    debug!(attempt, "dispatcher stopped");
}

/// Periodically republishes metrics and re-evaluates the refresh policy so
/// rates decay and idle backoff advances while no updates arrive.
async fn housekeeping_task(
    controller: ConnectionController,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                controller.publish_metrics();
                controller.reevaluate_refresh().await;
            }
        }
    }
    debug!("housekeeping stopped");
}
