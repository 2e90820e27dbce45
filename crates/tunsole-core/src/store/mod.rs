// ── Reconciled status store ──
//
// Single source of truth for daemon state on the client. Poll results,
// push events, optimistic edits and mutation confirmations all land here,
// each stamped with when it was observed; the newest observation wins.

mod routes;
mod slot;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::trace;

use crate::model::{DeviceStatus, ProxyConfig, ServiceStatus};
use crate::stream::SnapshotStream;

pub use routes::{RouteEntry, RouteTable, RouteWrite};
pub use slot::{Slot, Subscription};

// ── Keys and provenance ──────────────────────────────────────────────

/// The four resources the store reconciles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResourceKey {
    Device,
    Service,
    Proxy,
    Routes,
}

/// Which path produced a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Poll,
    Push,
    /// Applied locally ahead of server confirmation.
    Optimistic,
    /// Echoed back by a successful mutation.
    Confirmed,
}

/// A stored value together with its provenance.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    pub value: Arc<T>,
    pub source: Source,
    pub observed_at: DateTime<Utc>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            source: self.source,
            observed_at: self.observed_at,
        }
    }
}

impl<T> Snapshot<T> {
    /// Time since this value was observed.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.observed_at
    }
}

// ── Typed access ─────────────────────────────────────────────────────

/// A resource type with a dedicated slot in [`StatusStore`].
pub trait StoredResource: Send + Sync + Sized + 'static {
    const KEY: ResourceKey;

    #[doc(hidden)]
    fn slot(store: &StatusStore) -> &Slot<Self>;

    #[doc(hidden)]
    fn erase(value: Arc<Self>) -> ResourceValue;
}

impl StoredResource for DeviceStatus {
    const KEY: ResourceKey = ResourceKey::Device;
    fn slot(store: &StatusStore) -> &Slot<Self> {
        &store.device
    }
    fn erase(value: Arc<Self>) -> ResourceValue {
        ResourceValue::Device(value)
    }
}

impl StoredResource for ServiceStatus {
    const KEY: ResourceKey = ResourceKey::Service;
    fn slot(store: &StatusStore) -> &Slot<Self> {
        &store.service
    }
    fn erase(value: Arc<Self>) -> ResourceValue {
        ResourceValue::Service(value)
    }
}

impl StoredResource for ProxyConfig {
    const KEY: ResourceKey = ResourceKey::Proxy;
    fn slot(store: &StatusStore) -> &Slot<Self> {
        &store.proxy
    }
    fn erase(value: Arc<Self>) -> ResourceValue {
        ResourceValue::Proxy(value)
    }
}

impl StoredResource for RouteTable {
    const KEY: ResourceKey = ResourceKey::Routes;
    fn slot(store: &StatusStore) -> &Slot<Self> {
        &store.routes
    }
    fn erase(value: Arc<Self>) -> ResourceValue {
        ResourceValue::Routes(value)
    }
}

// ── Untyped access ───────────────────────────────────────────────────

/// Any stored value, for consumers that select the resource at runtime.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResourceValue {
    Device(Arc<DeviceStatus>),
    Service(Arc<ServiceStatus>),
    Proxy(Arc<ProxyConfig>),
    Routes(Arc<RouteTable>),
}

/// An untyped snapshot tagged with its resource key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    pub resource: ResourceKey,
    pub source: Source,
    pub observed_at: DateTime<Utc>,
    pub value: ResourceValue,
}

impl ResourceUpdate {
    fn from_snapshot<T: StoredResource>(snap: &Snapshot<T>) -> Self {
        Self {
            resource: T::KEY,
            source: snap.source,
            observed_at: snap.observed_at,
            value: T::erase(Arc::clone(&snap.value)),
        }
    }
}

// ── StatusStore ──────────────────────────────────────────────────────

/// Per-resource, timestamp-ordered state shared by every writer.
pub struct StatusStore {
    device: Slot<DeviceStatus>,
    service: Slot<ServiceStatus>,
    proxy: Slot<ProxyConfig>,
    routes: Slot<RouteTable>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self {
            device: Slot::new(),
            service: Slot::new(),
            proxy: Slot::new(),
            routes: Slot::new(),
        }
    }

    /// Current snapshot, or `None` if the resource was never observed.
    pub fn get<T: StoredResource>(&self) -> Option<Snapshot<T>> {
        T::slot(self).get()
    }

    /// Store a whole value observed at `at`. Returns `false` when a newer
    /// observation is already stored.
    pub fn put<T: StoredResource>(&self, value: T, source: Source, at: DateTime<Utc>) -> bool {
        let applied = T::slot(self).commit(source, at, |_| Some(value));
        trace!(resource = %T::KEY, %source, applied, "store write");
        applied
    }

    /// Apply a route delta or replacement observed at `at`.
    ///
    /// A delta against a table that was never loaded starts from empty.
    /// `Remove` of an absent cidr is a no-op and returns `false`; `Retire`
    /// always records the observation.
    pub fn put_routes(&self, write: RouteWrite, source: Source, at: DateTime<Utc>) -> bool {
        let applied = self.routes.commit(source, at, |current| {
            current.cloned().unwrap_or_default().apply(write, source)
        });
        trace!(resource = %ResourceKey::Routes, %source, applied, "store write");
        applied
    }

    /// Register a synchronous observer for every applied write to `T`.
    pub fn subscribe<T, F>(&self, observer: F) -> Subscription
    where
        T: StoredResource,
        F: Fn(&Snapshot<T>) + Send + Sync + 'static,
    {
        T::slot(self).subscribe(observer)
    }

    /// Async view over `T` for consumers that only need the latest value.
    pub fn watch<T: StoredResource>(&self) -> SnapshotStream<T> {
        SnapshotStream::new(T::slot(self).watch())
    }

    pub fn device(&self) -> Option<Snapshot<DeviceStatus>> {
        self.get()
    }

    pub fn service(&self) -> Option<Snapshot<ServiceStatus>> {
        self.get()
    }

    pub fn proxy(&self) -> Option<Snapshot<ProxyConfig>> {
        self.get()
    }

    pub fn routes(&self) -> Option<Snapshot<RouteTable>> {
        self.get()
    }

    pub fn get_any(&self, key: ResourceKey) -> Option<ResourceUpdate> {
        match key {
            ResourceKey::Device => self.device().as_ref().map(ResourceUpdate::from_snapshot),
            ResourceKey::Service => self.service().as_ref().map(ResourceUpdate::from_snapshot),
            ResourceKey::Proxy => self.proxy().as_ref().map(ResourceUpdate::from_snapshot),
            ResourceKey::Routes => self.routes().as_ref().map(ResourceUpdate::from_snapshot),
        }
    }

    pub fn subscribe_any<F>(&self, key: ResourceKey, observer: F) -> Subscription
    where
        F: Fn(&ResourceUpdate) + Send + Sync + 'static,
    {
        fn erased<T: StoredResource>(
            store: &StatusStore,
            f: impl Fn(&ResourceUpdate) + Send + Sync + 'static,
        ) -> Subscription {
            store.subscribe::<T, _>(move |snap| f(&ResourceUpdate::from_snapshot(snap)))
        }

        match key {
            ResourceKey::Device => erased::<DeviceStatus>(self, observer),
            ResourceKey::Service => erased::<ServiceStatus>(self, observer),
            ResourceKey::Proxy => erased::<ProxyConfig>(self, observer),
            ResourceKey::Routes => erased::<RouteTable>(self, observer),
        }
    }

    /// Source and age of the stored value, for staleness indicators.
    pub fn freshness(&self, key: ResourceKey) -> Option<(Source, TimeDelta)> {
        self.get_any(key)
            .map(|u| (u.source, Utc::now() - u.observed_at))
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{LinkState, Route};

    fn device(status: LinkState) -> DeviceStatus {
        DeviceStatus {
            name: "tunsocks".into(),
            exists: true,
            status,
            ip_address: None,
            mtu: Some(1500),
        }
    }

    #[test]
    fn stale_poll_cannot_overwrite_newer_push() {
        let store = StatusStore::new();
        let issued = Utc::now();
        let pushed = issued + TimeDelta::milliseconds(200);

        assert!(store.put(ServiceStatus { running: true, ..Default::default() }, Source::Push, pushed));
        assert!(!store.put(ServiceStatus::default(), Source::Poll, issued));

        let snap = store.service().unwrap();
        assert!(snap.value.running);
        assert_eq!(snap.source, Source::Push);
    }

    #[test]
    fn observers_see_updates_in_commit_order() {
        let store = StatusStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe::<DeviceStatus, _>(move |snap| {
            sink.lock().unwrap().push(snap.value.status);
        });

        let t = Utc::now();
        store.put(device(LinkState::Down), Source::Poll, t);
        store.put(device(LinkState::Up), Source::Poll, t + TimeDelta::seconds(1));

        assert_eq!(*seen.lock().unwrap(), vec![LinkState::Down, LinkState::Up]);
    }

    #[test]
    fn route_delta_on_unloaded_table_starts_empty() {
        let store = StatusStore::new();
        let route = Route {
            cidr: "10.0.0.0/8".into(),
            gateway: "198.18.0.1".into(),
            device: String::new(),
            metric: 100,
        };
        assert!(store.put_routes(RouteWrite::Upsert(route), Source::Optimistic, Utc::now()));
        let table = store.routes().unwrap();
        assert_eq!(table.value.len(), 1);
        assert_eq!(table.source, Source::Optimistic);
    }

    #[test]
    fn untyped_access_tags_resource() {
        let store = StatusStore::new();
        assert!(store.get_any(ResourceKey::Proxy).is_none());

        store.put(ProxyConfig::default(), Source::Confirmed, Utc::now());
        let update = store.get_any(ResourceKey::Proxy).unwrap();
        assert_eq!(update.resource, ResourceKey::Proxy);
        assert_eq!(update.source, Source::Confirmed);
        assert!(matches!(update.value, ResourceValue::Proxy(_)));

        let (source, age) = store.freshness(ResourceKey::Proxy).unwrap();
        assert_eq!(source, Source::Confirmed);
        assert!(age >= TimeDelta::zero());
    }

    #[test]
    fn resource_key_parses_case_insensitively() {
        assert_eq!("Routes".parse::<ResourceKey>().unwrap(), ResourceKey::Routes);
        assert_eq!(ResourceKey::Device.to_string(), "device");
    }
}
