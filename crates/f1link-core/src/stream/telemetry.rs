// ── Telemetry snapshot subscription ──
//
// The version channel only carries a counter; snapshots are loaded from
// the shared `ArcSwap` cell, so observers never hold anything a writer needs.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::Subscription;
use crate::model::TelemetrySnapshot;

pub struct TelemetryStream {
    current: Arc<TelemetrySnapshot>,
    version: watch::Receiver<u64>,
    cell: Arc<ArcSwap<TelemetrySnapshot>>,
}

impl TelemetryStream {
    pub(crate) fn new(version: watch::Receiver<u64>, cell: Arc<ArcSwap<TelemetrySnapshot>>) -> Self {
        let current = cell.load_full();
        Self {
            current,
            version,
            cell,
        }
    }

    /// The snapshot last seen by this subscription.
    pub fn current(&self) -> &Arc<TelemetrySnapshot> {
        &self.current
    }

    /// The latest published snapshot.
    pub fn latest(&self) -> Arc<TelemetrySnapshot> {
        self.cell.load_full()
    }

    /// Wait for the next publication. Returns `None` once the client is gone.
    pub async fn changed(&mut self) -> Option<Arc<TelemetrySnapshot>> {
        self.version.changed().await.ok()?;
        let snap = self.cell.load_full();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Hand each newly published snapshot to `listener` on a dedicated task
    /// until the returned [`Subscription`] is dropped.
    pub fn on_change<F>(self, mut listener: F) -> Subscription
    where
        F: FnMut(&Arc<TelemetrySnapshot>) + Send + 'static,
    {
        let Self {
            mut version, cell, ..
        } = self;
        Subscription::spawn(|token| async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    changed = version.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        listener(&cell.load_full());
                    }
                }
            }
        })
    }

    pub fn into_stream(self) -> TelemetryWatchStream {
        TelemetryWatchStream {
            versions: WatchStream::new(self.version),
            cell: self.cell,
        }
    }
}

/// `Stream` of telemetry snapshots: the current one, then one per
/// publication (bursts coalesce).
pub struct TelemetryWatchStream {
    versions: WatchStream<u64>,
    cell: Arc<ArcSwap<TelemetrySnapshot>>,
}

impl Stream for TelemetryWatchStream {
    type Item = Arc<TelemetrySnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        Pin::new(&mut this.versions)
            .poll_next(cx)
            .map(|version| version.map(|_| this.cell.load_full()))
    }
}
