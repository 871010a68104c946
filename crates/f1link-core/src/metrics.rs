// ── Client-side metrics ──
//
// Lock-free counters incremented from the delivery context and read from
// any thread. Rates come from one-second buckets over a trailing window,
// never from lifetime totals.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::MetricsConfig;

const COUNT_MASK: u64 = 0xFFFF_FFFF;

/// Point-in-time copy of the client's metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub count_of_updates: u64,
    pub up_time_in_seconds: u64,
    pub count_of_successful_topic_source_updates: u64,
    pub count_of_failed_topic_source_updates: u64,
    pub rate_of_updates_per_second: u64,
    pub rate_of_successful_topic_source_updates_per_second: u64,
    /// Connect failures, subscribe failures and unexpected drops.
    pub count_of_connection_failures: u64,
}

/// One second of activity. Each cell packs `second << 32 | count` so a
/// bucket rolls over to a new second in a single atomic step.
#[derive(Debug, Default)]
struct RateBucket {
    updates: AtomicU64,
    successes: AtomicU64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    origin: Instant,
    window_secs: u64,
    updates: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    connection_failures: AtomicU64,
    first_connected: OnceLock<Instant>,
    /// Millis since `origin` of the last successful update, plus one. Zero
    /// means no update yet.
    last_update: AtomicU64,
    buckets: Box<[RateBucket]>,
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Self {
        Self::with_origin(config, Instant::now())
    }

    pub(crate) fn with_origin(config: &MetricsConfig, origin: Instant) -> Self {
        let window_secs = config
            .window
            .as_secs()
            .clamp(1, MetricsConfig::MAX_WINDOW.as_secs());
        let buckets = (0..window_secs).map(|_| RateBucket::default()).collect();
        Self {
            origin,
            window_secs,
            updates: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            first_connected: OnceLock::new(),
            last_update: AtomicU64::new(0),
            buckets,
        }
    }

    // ── Recording ────────────────────────────────────────────────────

    pub fn record_success(&self) {
        self.record_success_at(Instant::now());
    }

    pub fn record_success_at(&self, now: Instant) {
        saturating_increment(&self.updates);
        saturating_increment(&self.successes);

        let second = self.second_of(now);
        let bucket = self.bucket(second);
        bump_bucket(&bucket.updates, second);
        bump_bucket(&bucket.successes, second);

        let millis = u64::try_from(now.saturating_duration_since(self.origin).as_millis())
            .unwrap_or(u64::MAX - 1);
        self.last_update
            .store(millis.saturating_add(1), Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        saturating_increment(&self.updates);
        saturating_increment(&self.failures);

        let second = self.second_of(now);
        bump_bucket(&self.bucket(second).updates, second);
    }

    pub fn record_connection_failure(&self) {
        saturating_increment(&self.connection_failures);
    }

    /// Start the uptime clock. Only the first call has any effect.
    pub fn mark_connected(&self) {
        self.mark_connected_at(Instant::now());
    }

    pub fn mark_connected_at(&self, now: Instant) {
        let _ = self.first_connected.get_or_init(|| now);
    }

    // ── Reading ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let current = self.second_of(now);
        let (updates_in_window, successes_in_window) =
            self.buckets.iter().fold((0u64, 0u64), |(u, s), bucket| {
                (
                    u.saturating_add(self.count_in_window(&bucket.updates, current)),
                    s.saturating_add(self.count_in_window(&bucket.successes, current)),
                )
            });

        MetricsSnapshot {
            count_of_updates: self.updates.load(Ordering::Relaxed),
            up_time_in_seconds: self
                .first_connected
                .get()
                .map_or(0, |start| now.saturating_duration_since(*start).as_secs()),
            count_of_successful_topic_source_updates: self.successes.load(Ordering::Relaxed),
            count_of_failed_topic_source_updates: self.failures.load(Ordering::Relaxed),
            rate_of_updates_per_second: self.average(updates_in_window),
            rate_of_successful_topic_source_updates_per_second: self.average(successes_in_window),
            count_of_connection_failures: self.connection_failures.load(Ordering::Relaxed),
        }
    }

    /// Time since the last successful update, `None` if there never was one.
    pub fn last_update_age(&self, now: Instant) -> Option<Duration> {
        match self.last_update.load(Ordering::Relaxed) {
            0 => None,
            stamp => {
                let at = self.origin + Duration::from_millis(stamp - 1);
                Some(now.saturating_duration_since(at))
            }
        }
    }

    // ── Buckets ──────────────────────────────────────────────────────

    fn second_of(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_secs()
    }

    fn bucket(&self, second: u64) -> &RateBucket {
        // One bucket per second of the window.
        let index = usize::try_from(second % self.window_secs).unwrap_or_default();
        &self.buckets[index]
    }

    fn count_in_window(&self, cell: &AtomicU64, current: u64) -> u64 {
        let packed = cell.load(Ordering::Relaxed);
        let second = packed >> 32;
        let in_window = second <= current && current - second < self.window_secs;
        if in_window { packed & COUNT_MASK } else { 0 }
    }

    /// `round(total / window_secs)`.
    fn average(&self, total: u64) -> u64 {
        total.saturating_add(self.window_secs / 2) / self.window_secs
    }
}

fn saturating_increment(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_add(1));
}

fn bump_bucket(cell: &AtomicU64, second: u64) {
    let second = second & COUNT_MASK;
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |packed| {
        if packed >> 32 == second {
            let count = packed & COUNT_MASK;
            Some((second << 32) | (count + 1).min(COUNT_MASK))
        } else {
            Some((second << 32) | 1)
        }
    });
}
