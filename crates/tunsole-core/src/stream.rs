// ── Reactive snapshot streams ──
//
// Async view over a single store slot, for consumers that only care about
// the latest value rather than every intermediate commit.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::Snapshot;

/// A subscription to one resource.
///
/// Provides point-in-time access plus change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`. Unlike a
/// synchronous observer, slow readers only ever see the newest value.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    current: Option<Snapshot<T>>,
    receiver: watch::Receiver<Option<Snapshot<T>>>,
}

impl<T: Send + Sync + 'static> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Option<Snapshot<T>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> Option<&Snapshot<T>> {
        self.current.as_ref()
    }

    pub fn latest(&self) -> Option<Snapshot<T>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next committed value.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        loop {
            self.receiver.changed().await.ok()?;
            let snap = self.receiver.borrow_and_update().clone();
            if let Some(snap) = snap {
                self.current = Some(snap.clone());
                return Some(snap);
            }
        }
    }

    pub fn into_stream(self) -> SnapshotWatchStream<T> {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each newly observed snapshot, starting with
/// the current one if the resource has been loaded.
pub struct SnapshotWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Option<Snapshot<T>>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotWatchStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(snap))) => return Poll::Ready(Some(snap)),
                Poll::Ready(Some(None)) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::{TimeDelta, Utc};
    use futures_util::StreamExt;

    use crate::model::ServiceStatus;
    use crate::store::{Source, StatusStore};

    #[tokio::test]
    async fn changed_skips_to_latest_value() {
        let store = StatusStore::new();
        let mut stream = store.watch::<ServiceStatus>();
        assert!(stream.current().is_none());

        let t = Utc::now();
        store.put(ServiceStatus::default(), Source::Poll, t);
        store.put(
            ServiceStatus { running: true, ..Default::default() },
            Source::Push,
            t + TimeDelta::seconds(1),
        );

        let snap = stream.changed().await.unwrap();
        assert!(snap.value.running);
        assert_eq!(snap.source, Source::Push);
    }

    #[tokio::test]
    async fn into_stream_skips_unloaded_state() {
        let store = StatusStore::new();
        let mut stream = store.watch::<ServiceStatus>().into_stream();

        store.put(ServiceStatus::default(), Source::Poll, Utc::now());
        let snap = stream.next().await.unwrap();
        assert_eq!(snap.source, Source::Poll);
    }

    #[test]
    fn stream_wakes_on_first_write() {
        let store = StatusStore::new();
        let mut stream = tokio_test::task::spawn(store.watch::<ServiceStatus>().into_stream());
        tokio_test::assert_pending!(stream.poll_next());

        store.put(ServiceStatus::default(), Source::Poll, Utc::now());
        assert!(stream.is_woken());
        let snap = tokio_test::assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(snap.source, Source::Poll);
    }
}
