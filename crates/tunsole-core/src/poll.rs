// ── Polling controller ──
//
// Periodic and on-demand refresh of every resource. Schedules are
// reference-counted by subscribers; each resource has at most one request
// outstanding, and ticks that land while one is in flight are skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tunsole_api::ApiClient;

use crate::config::PollConfig;
use crate::error::CoreError;
use crate::model::{DeviceStatus, ProxyConfig, Route, ServiceStatus};
use crate::store::{ResourceKey, RouteWrite, Source, StatusStore};

/// Result of a single refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched value became the stored value.
    Applied,
    /// A newer observation was already stored; the fetch was dropped.
    Stale,
    /// A request for this resource was already in flight.
    Skipped,
    /// The schedule was cancelled while the request was in flight.
    Discarded,
}

/// A failed poll, broadcast for consumers that surface notifications.
#[derive(Debug, Clone)]
pub struct PollFailure {
    pub resource: ResourceKey,
    pub message: String,
    pub unauthenticated: bool,
}

struct Schedule {
    subscribers: usize,
    cancel: CancellationToken,
}

#[derive(Default)]
struct InFlight {
    device: AtomicBool,
    service: AtomicBool,
    proxy: AtomicBool,
    routes: AtomicBool,
    /// Signalled whenever any flag is cleared.
    released: Notify,
}

impl InFlight {
    fn flag(&self, key: ResourceKey) -> &AtomicBool {
        match key {
            ResourceKey::Device => &self.device,
            ResourceKey::Service => &self.service,
            ResourceKey::Proxy => &self.proxy,
            ResourceKey::Routes => &self.routes,
        }
    }
}

/// Releases the in-flight flag when the request finishes, however it ends.
struct InFlightGuard {
    inner: Arc<PollInner>,
    key: ResourceKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.flag(self.key).store(false, Ordering::Release);
        self.inner.in_flight.released.notify_waiters();
    }
}

enum Fetched {
    Device(DeviceStatus),
    Service(ServiceStatus),
    Proxy(ProxyConfig),
    Routes(Vec<Route>),
}

struct PollInner {
    client: Arc<ApiClient>,
    store: Arc<StatusStore>,
    config: PollConfig,
    in_flight: InFlight,
    schedules: DashMap<ResourceKey, Schedule>,
    failures: broadcast::Sender<PollFailure>,
    cancel: CancellationToken,
}

/// Owns poll schedules for one session. Cheaply cloneable.
#[derive(Clone)]
pub struct PollingController {
    inner: Arc<PollInner>,
}

impl PollingController {
    /// `cancel` is the session token; cancelling it stops every schedule.
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<StatusStore>,
        config: PollConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (failures, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(PollInner {
                client,
                store,
                config,
                in_flight: InFlight::default(),
                schedules: DashMap::new(),
                failures,
                cancel,
            }),
        }
    }

    pub(crate) fn client(&self) -> &Arc<ApiClient> {
        &self.inner.client
    }

    pub(crate) fn store(&self) -> &Arc<StatusStore> {
        &self.inner.store
    }

    /// Cadence for `key`: device on the fast interval, the rest on the slow one.
    pub fn interval_for(&self, key: ResourceKey) -> Duration {
        match key {
            ResourceKey::Device => self.inner.config.device_interval,
            ResourceKey::Service | ResourceKey::Proxy | ResourceKey::Routes => {
                self.inner.config.slow_interval
            }
        }
    }

    /// Start (or join) the periodic schedule for `key`.
    ///
    /// The first subscriber fetches immediately and then every interval.
    /// Must be called within a tokio runtime.
    pub fn subscribe(&self, key: ResourceKey) -> PollSubscription {
        let start = {
            let mut schedule = self.inner.schedules.entry(key).or_insert_with(|| Schedule {
                subscribers: 0,
                cancel: self.inner.cancel.child_token(),
            });
            schedule.subscribers += 1;
            (schedule.subscribers == 1).then(|| schedule.cancel.clone())
        };

        if let Some(cancel) = start {
            debug!(resource = %key, interval = ?self.interval_for(key), "starting poll schedule");
            tokio::spawn(schedule_loop(self.clone(), key, cancel));
        }

        PollSubscription {
            controller: self.clone(),
            key,
        }
    }

    /// Whether a periodic schedule is currently running for `key`.
    pub fn is_scheduled(&self, key: ResourceKey) -> bool {
        self.inner.schedules.contains_key(&key)
    }

    /// Fetch `key` now, unless a request for it is already outstanding.
    pub async fn refresh(&self, key: ResourceKey) -> Result<RefreshOutcome, CoreError> {
        let Some(_guard) = self.try_begin(key) else {
            debug!(resource = %key, "refresh skipped, request already in flight");
            return Ok(RefreshOutcome::Skipped);
        };
        self.fetch_and_store(key, None).await
    }

    /// Fetch `key` with a request issued now. A request already in flight
    /// was issued earlier, so it is waited out rather than reused.
    pub async fn reanchor(&self, key: ResourceKey) -> Result<RefreshOutcome, CoreError> {
        let guard = loop {
            let released = self.inner.in_flight.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();
            if let Some(guard) = self.try_begin(key) {
                break guard;
            }
            debug!(resource = %key, "waiting for in-flight request before re-fetching");
            released.await;
        };
        let outcome = self.fetch_and_store(key, None).await;
        drop(guard);
        outcome
    }

    /// Poll failures as they happen.
    pub fn failures(&self) -> broadcast::Receiver<PollFailure> {
        self.inner.failures.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn try_begin(&self, key: ResourceKey) -> Option<InFlightGuard> {
        self.inner
            .in_flight
            .flag(key)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                inner: Arc::clone(&self.inner),
                key,
            })
    }

    fn release(&self, key: ResourceKey) {
        if let Entry::Occupied(mut schedule) = self.inner.schedules.entry(key) {
            let remaining = schedule.get().subscribers.saturating_sub(1);
            schedule.get_mut().subscribers = remaining;
            if remaining == 0 {
                schedule.remove().cancel.cancel();
                debug!(resource = %key, "last subscriber gone, poll schedule cancelled");
            }
        }
    }

    /// Issue one request and store its result, stamped with the time the
    /// request was issued. `schedule` is the token of the schedule that
    /// triggered it; a cancelled schedule discards the result.
    async fn fetch_and_store(
        &self,
        key: ResourceKey,
        schedule: Option<&CancellationToken>,
    ) -> Result<RefreshOutcome, CoreError> {
        let issued = Utc::now();
        let result = self.fetch(key).await;

        if schedule.is_some_and(CancellationToken::is_cancelled) {
            debug!(resource = %key, "discarding poll result, no subscribers remain");
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(fetched) => {
                let applied = self.apply(fetched, issued);
                debug!(resource = %key, applied, "poll complete");
                Ok(if applied {
                    RefreshOutcome::Applied
                } else {
                    RefreshOutcome::Stale
                })
            }
            Err(e) => {
                warn!(resource = %key, error = %e, "poll failed");
                let _ = self.inner.failures.send(PollFailure {
                    resource: key,
                    message: e.to_string(),
                    unauthenticated: e.is_unauthenticated(),
                });
                Err(e)
            }
        }
    }

    async fn fetch(&self, key: ResourceKey) -> Result<Fetched, CoreError> {
        let client = &self.inner.client;
        let fetched = match key {
            ResourceKey::Device => Fetched::Device(client.get_device().await?.into()),
            ResourceKey::Service => Fetched::Service(client.get_service().await?.into()),
            ResourceKey::Proxy => Fetched::Proxy(client.get_proxy().await?.into()),
            ResourceKey::Routes => Fetched::Routes(
                client
                    .list_routes()
                    .await?
                    .into_iter()
                    .map(Route::from)
                    .collect(),
            ),
        };
        Ok(fetched)
    }

    fn apply(&self, fetched: Fetched, at: DateTime<Utc>) -> bool {
        let store = &self.inner.store;
        match fetched {
            Fetched::Device(v) => store.put(v, Source::Poll, at),
            Fetched::Service(v) => store.put(v, Source::Poll, at),
            Fetched::Proxy(v) => store.put(v, Source::Poll, at),
            Fetched::Routes(v) => store.put_routes(RouteWrite::Replace(v), Source::Poll, at),
        }
    }
}

// ── Subscription handle ──────────────────────────────────────────────

/// Keeps a poll schedule alive. Dropping the last handle for a resource
/// cancels its future ticks.
#[must_use = "dropping a PollSubscription cancels its schedule"]
pub struct PollSubscription {
    controller: PollingController,
    key: ResourceKey,
}

impl PollSubscription {
    pub fn resource(&self) -> ResourceKey {
        self.key
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.controller.release(self.key);
    }
}

// ── Schedule task ────────────────────────────────────────────────────

async fn schedule_loop(controller: PollingController, key: ResourceKey, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(controller.interval_for(key));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(guard) = controller.try_begin(key) {
                    let controller = controller.clone();
                    let cancel = cancel.clone();
                    // Detached so cancellation lets the request finish.
                    tokio::spawn(async move {
                        let _guard = guard;
                        let _ = controller.fetch_and_store(key, Some(&cancel)).await;
                    });
                } else {
                    debug!(resource = %key, "previous poll still in flight, skipping tick");
                }
            }
        }
    }

    debug!(resource = %key, "poll schedule stopped");
}
