// ── Copy-on-write telemetry state ──
//
// The current snapshot lives in an `ArcSwap`: readers load it without
// locking, writers build a modified copy and swap it in. A version counter
// on a `watch` channel tells subscribers something changed.

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tokio::sync::watch;

use crate::error::DecodeError;
use crate::model::{TelemetrySnapshot, TelemetryValue};
use crate::stream::TelemetryStream;

#[derive(Debug)]
pub struct TelemetryState {
    current: Arc<ArcSwap<TelemetrySnapshot>>,
    /// Bumped once per published snapshot.
    version: watch::Sender<u64>,
}

impl TelemetryState {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            current: Arc::new(ArcSwap::from_pointee(TelemetrySnapshot::default())),
            version,
        }
    }

    /// The latest published snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.current.load_full()
    }

    /// Number of snapshots published so far.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> TelemetryStream {
        TelemetryStream::new(self.version.subscribe(), Arc::clone(&self.current))
    }

    /// Apply `value` to a copy of the current snapshot and publish it.
    ///
    /// On error nothing is published and the previous snapshot stays current.
    pub(crate) fn apply(
        &self,
        value: &TelemetryValue,
    ) -> Result<Arc<TelemetrySnapshot>, DecodeError> {
        let mut current = self.current.load_full();
        loop {
            let mut next = TelemetrySnapshot::clone(&current);
            next.apply(value)?;
            let next = Arc::new(next);

            let previous = self.current.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                // `send_modify` notifies even with zero receivers.
                self.version.send_modify(|v| *v = v.wrapping_add(1));
                return Ok(next);
            }
            current = Guard::into_inner(previous);
        }
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}
