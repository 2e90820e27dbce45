// ── Single-resource slot ──
//
// One timestamped value plus its observers. Commits are serialized per
// slot so observers see updates in commit order, and the newest
// observation by timestamp always wins regardless of which path wrote it.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::{Snapshot, Source};

type Observer<T> = Arc<dyn Fn(&Snapshot<T>) + Send + Sync>;

struct ObserverList<T> {
    next_id: u64,
    entries: Vec<(u64, Observer<T>)>,
}

/// Storage for one resource. Only reachable through [`StatusStore`](super::StatusStore).
pub struct Slot<T> {
    state: watch::Sender<Option<Snapshot<T>>>,
    commit: Mutex<()>,
    observers: Arc<Mutex<ObserverList<T>>>,
}

impl<T: Send + Sync + 'static> Slot<T> {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            commit: Mutex::new(()),
            observers: Arc::new(Mutex::new(ObserverList {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn get(&self) -> Option<Snapshot<T>> {
        self.state.borrow().clone()
    }

    /// Apply `update` unless the stored observation is newer than `at`.
    ///
    /// `update` receives the current value and returns the replacement, or
    /// `None` to leave the slot untouched. Returns whether a new snapshot
    /// was committed. Observers run on the calling thread before this
    /// returns; they must not write to the same slot.
    pub(crate) fn commit<F>(&self, source: Source, at: DateTime<Utc>, update: F) -> bool
    where
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let _serial = self.commit.lock().unwrap_or_else(PoisonError::into_inner);

        let mut applied = None;
        self.state.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| at < c.observed_at) {
                return false;
            }
            let Some(next) = update(current.as_ref().map(|c| c.value.as_ref())) else {
                return false;
            };
            let snapshot = Snapshot {
                value: Arc::new(next),
                source,
                observed_at: at,
            };
            applied = Some(snapshot.clone());
            *current = Some(snapshot);
            true
        });

        let Some(snapshot) = applied else {
            return false;
        };

        // Clone the list so observers may subscribe/unsubscribe re-entrantly.
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer(&snapshot);
        }
        true
    }

    pub(crate) fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Snapshot<T>) + Send + Sync + 'static,
    {
        let id = {
            let mut list = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::new(observer)));
            id
        };

        let weak: Weak<Mutex<ObserverList<T>>> = Arc::downgrade(&self.observers);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(list) = weak.upgrade() {
                    list.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entries
                        .retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Option<Snapshot<T>>> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// Handle for a synchronous store observer. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Stop receiving notifications. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
