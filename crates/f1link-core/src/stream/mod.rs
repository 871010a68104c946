// ── Observable fields ──
//
// Every value the client exposes is an `Observable`: readable at any time,
// subscribable as a `FieldStream`, or watched with a listener.
//
// Listeners are marshaled: each `on_change` subscription runs on its own
// tokio task, never on the context that performed the mutation. Values
// coalesce, so a slow listener sees the latest value rather than every
// intermediate one.

mod telemetry;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use telemetry::{TelemetryStream, TelemetryWatchStream};

/// A read-only, change-notifying value owned by the controller.
#[derive(Debug)]
pub struct Observable<T: Clone + Send + Sync + 'static> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> FieldStream<T> {
        FieldStream::new(self.tx.subscribe())
    }

    /// Call `listener` with every new value until the returned
    /// [`Subscription`] is dropped. Must be called within a tokio runtime.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.subscribe().on_change(listener)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Observable<T> {
    /// Store `value`, notifying only if it differs. Returns whether it did.
    pub(crate) fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

/// Handle for a listener registered with one of the `on_change` methods.
///
/// Delivery stops when this is dropped.
#[must_use = "dropping a Subscription immediately stops delivery"]
#[derive(Debug)]
pub struct Subscription {
    _guard: DropGuard,
}

impl Subscription {
    /// Spawn `task` with a token that is cancelled when the subscription drops.
    fn spawn<Fut>(task: impl FnOnce(CancellationToken) -> Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        tokio::spawn(task(cancel.clone()));
        Self {
            _guard: cancel.drop_guard(),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// A subscription to one observable field.
///
/// Provides both the value at subscription time and change notification
/// via `changed()` or by converting to a `Stream`.
pub struct FieldStream<T: Clone + Send + Sync + 'static> {
    current: T,
    receiver: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> FieldStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<T>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The value last seen by this subscription.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The latest value (may have changed since creation).
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the owner is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        let value = self.receiver.borrow_and_update().clone();
        self.current = value.clone();
        Some(value)
    }

    /// Wait until the value satisfies `predicate`, including the current one.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let value = self
            .receiver
            .wait_for(|value| predicate(value))
            .await
            .ok()?
            .clone();
        self.current = value.clone();
        Some(value)
    }

    /// Hand every later change to `listener` on a dedicated task until the
    /// returned [`Subscription`] is dropped.
    pub fn on_change<F>(self, mut listener: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut rx = self.receiver;
        Subscription::spawn(|token| async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Clone out so the listener never holds the channel lock.
                        let value = rx.borrow_and_update().clone();
                        listener(&value);
                    }
                }
            }
        })
    }

    pub fn into_stream(self) -> FieldWatchStream<T> {
        FieldWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding the field's value on subscription and after
/// each change.
pub struct FieldWatchStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<T>,
}

impl<T: Clone + Send + Sync + 'static> Stream for FieldWatchStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures_util::StreamExt;

    use super::*;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn set_reports_modification() {
        let field = Observable::new(1u32);
        assert!(!field.set(1));
        assert!(field.set(2));
        assert_eq!(field.get(), 2);
    }

    #[tokio::test]
    async fn field_stream_sees_changes() {
        let field = Observable::new("a".to_owned());
        let mut sub = field.subscribe();
        assert_eq!(sub.current(), "a");

        field.set("b".to_owned());
        assert_eq!(sub.latest(), "b");
        assert_eq!(sub.changed().await.as_deref(), Some("b"));
        assert_eq!(sub.current(), "b");
    }

    #[test]
    fn changed_is_pending_until_set() {
        let field = Observable::new(0u8);
        let mut sub = field.subscribe();
        let mut changed = tokio_test::task::spawn(sub.changed());
        tokio_test::assert_pending!(changed.poll());

        field.set(1);
        assert!(changed.is_woken());
        assert_eq!(tokio_test::assert_ready!(changed.poll()), Some(1));
    }

    #[tokio::test]
    async fn equal_values_do_not_notify() {
        let field = Observable::new(5u8);
        let sub = field.subscribe();
        field.set(5);
        assert!(!sub.receiver.has_changed().unwrap());
    }

    #[tokio::test]
    async fn changed_ends_when_owner_drops() {
        let field = Observable::new(0u8);
        let mut sub = field.subscribe();
        drop(field);
        assert_eq!(sub.changed().await, None);
    }

    #[tokio::test]
    async fn wait_for_matches_current_value() {
        let field = Observable::new(3u8);
        let mut sub = field.subscribe();
        assert_eq!(sub.wait_for(|v| *v == 3).await, Some(3));
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_changes() {
        let field = Observable::new(0u8);
        let mut stream = field.subscribe().into_stream();
        assert_eq!(stream.next().await, Some(0));

        field.set(7);
        assert_eq!(stream.next().await, Some(7));
    }

    #[tokio::test]
    async fn listener_runs_until_unsubscribed() {
        let field = Observable::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let subscription = field.on_change(move |v| sink.lock().unwrap().push(*v));
        settle().await;

        field.set(1);
        settle().await;
        field.set(2);
        settle().await;
        subscription.unsubscribe();
        settle().await;
        field.set(3);
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn listener_coalesces_bursts() {
        let field = Observable::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _subscription = field.on_change(move |v| sink.lock().unwrap().push(*v));

        // No yield between writes: the listener task only sees the last one.
        for v in 1..=10 {
            field.set(v);
        }
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![10]);
    }
}
