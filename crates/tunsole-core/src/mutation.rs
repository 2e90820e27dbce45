// ── Mutation coordinator ──
//
// User-initiated route and proxy changes. Route edits are applied to the
// store optimistically and rolled back to the exact prior entry when the
// daemon refuses them. One add or delete per cidr may be outstanding.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{debug, info, warn};

use tunsole_api::{AddRouteRequest, ApiClient, ProxyConfigPayload};

use crate::error::CoreError;
use crate::model::{Cidr, ProxyConfig, ProxyType, Route};
use crate::store::{RouteEntry, RouteWrite, Source, StatusStore};
use crate::validate::{normalize_cidr, normalize_gateway, normalize_host_port};

/// Gateway used when the device address is not known yet.
pub const DEFAULT_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 18, 0, 1));
pub const DEFAULT_METRIC: u32 = 100;

const ADD_ROUTE_FAILED: &str = "Failed to add route";
const DELETE_ROUTE_FAILED: &str = "Failed to delete route";
const SAVE_PROXY_FAILED: &str = "Failed to update proxy configuration";

/// Per-cidr mutation lifecycle. `Confirmed` and `RolledBack` are
/// momentary: the slot returns to `Idle` as soon as either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationPhase {
    Idle,
    Submitting,
    Confirmed,
    RolledBack,
}

/// A route ready to submit, with the gateway filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDraft {
    pub cidr: Cidr,
    pub gateway: IpAddr,
    pub metric: u32,
}

/// Operator input for a new route.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub cidr: String,
    /// Explicit gateway; composed from the device address when absent.
    pub gateway: Option<String>,
    pub metric: Option<u32>,
}

impl RouteRequest {
    pub fn new(cidr: impl Into<String>) -> Self {
        Self {
            cidr: cidr.into(),
            ..Self::default()
        }
    }
}

/// Operator input for the upstream proxy.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub proxy_type: ProxyType,
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

// ── Slot guard ───────────────────────────────────────────────────────

/// Holds a cidr in `Submitting`; dropping it returns the slot to `Idle`.
struct SlotGuard {
    slots: Arc<DashMap<String, MutationPhase>>,
    key: String,
}

impl SlotGuard {
    fn settle(self, phase: MutationPhase) {
        if let Some(mut slot) = self.slots.get_mut(&self.key) {
            *slot = phase;
        }
        debug!(cidr = %self.key, ?phase, "mutation settled");
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.remove(&self.key);
    }
}

// ── MutationCoordinator ──────────────────────────────────────────────

#[derive(Clone)]
pub struct MutationCoordinator {
    client: Arc<ApiClient>,
    store: Arc<StatusStore>,
    slots: Arc<DashMap<String, MutationPhase>>,
}

impl MutationCoordinator {
    pub fn new(client: Arc<ApiClient>, store: Arc<StatusStore>) -> Self {
        Self {
            client,
            store,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Current phase for `cidr`, keyed by its normalized form when valid.
    pub fn phase(&self, cidr: &str) -> MutationPhase {
        let key = normalize_cidr(cidr).map_or_else(|_| cidr.to_owned(), |c| c.to_string());
        self.slots.get(&key).map_or(MutationPhase::Idle, |p| *p)
    }

    /// Build a draft whose gateway is the device address without its
    /// prefix, or [`DEFAULT_GATEWAY`] when the device is unknown.
    pub fn compose_route(&self, cidr: &str, metric: Option<u32>) -> Result<RouteDraft, CoreError> {
        let cidr = normalize_cidr(cidr)?;
        let gateway = self
            .store
            .device()
            .and_then(|snap| snap.value.ip_address)
            .map_or(DEFAULT_GATEWAY, |net| net.addr());
        Ok(RouteDraft {
            cidr,
            gateway,
            metric: metric.unwrap_or(DEFAULT_METRIC),
        })
    }

    /// Add (or replace) a route. The store shows it immediately; it is
    /// confirmed from the daemon's reply or rolled back on failure.
    pub async fn add_route(&self, request: RouteRequest) -> Result<Route, CoreError> {
        let mut draft = self.compose_route(&request.cidr, request.metric)?;
        if let Some(gateway) = request.gateway.as_deref() {
            draft.gateway = normalize_gateway(gateway)?;
        }

        let key = draft.cidr.to_string();
        let guard = self.begin(&key)?;

        let (prior, table_source) = self.prior_entry(&key);
        let device = self.known_device_name();
        let submitted = Route {
            cidr: key.clone(),
            gateway: draft.gateway.to_string(),
            device: device.clone(),
            metric: draft.metric,
        };
        self.store
            .put_routes(RouteWrite::Upsert(submitted.clone()), Source::Optimistic, Utc::now());

        let request = AddRouteRequest {
            cidr: key.clone(),
            gateway: submitted.gateway.clone(),
            metric: i64::from(submitted.metric),
        };

        match self.client.add_route(&request).await {
            Ok(reply) => {
                let confirmed = match reply {
                    Some(reply) => {
                        let mut route = Route::from(reply);
                        if route.device.is_empty() {
                            route.device = device;
                        }
                        if route.cidr.is_empty() {
                            route.cidr.clone_from(&key);
                        }
                        route
                    }
                    None => submitted,
                };

                let now = Utc::now();
                if confirmed.cidr != key {
                    self.store
                        .put_routes(RouteWrite::Remove(key.clone()), Source::Confirmed, now);
                }
                self.store
                    .put_routes(RouteWrite::Upsert(confirmed.clone()), Source::Confirmed, now);

                guard.settle(MutationPhase::Confirmed);
                info!(cidr = %confirmed.cidr, gateway = %confirmed.gateway, "route added");
                Ok(confirmed)
            }
            Err(e) => {
                let rollback = match prior {
                    Some((index, entry)) => RouteWrite::Restore { entry, index },
                    None => RouteWrite::Remove(key.clone()),
                };
                self.store.put_routes(rollback, table_source, Utc::now());

                guard.settle(MutationPhase::RolledBack);
                let err = CoreError::from_api_with_fallback(e, ADD_ROUTE_FAILED);
                warn!(cidr = %key, error = %err, "add route failed, rolled back");
                Err(err)
            }
        }
    }

    /// Delete a route. Removed from the store immediately; the exact
    /// prior entry is reinserted at its prior position on failure.
    pub async fn delete_route(&self, cidr: &str) -> Result<(), CoreError> {
        let key = normalize_cidr(cidr)?.to_string();
        let guard = self.begin(&key)?;

        let (prior, table_source) = self.prior_entry(&key);
        if prior.is_some() {
            self.store
                .put_routes(RouteWrite::Remove(key.clone()), Source::Optimistic, Utc::now());
        }

        match self.client.delete_route(&key).await {
            Ok(()) => {
                // A poll served before the daemon applied the delete may
                // have put the route back since the optimistic remove.
                self.store
                    .put_routes(RouteWrite::Retire(key.clone()), Source::Confirmed, Utc::now());
                guard.settle(MutationPhase::Confirmed);
                info!(cidr = %key, "route deleted");
                Ok(())
            }
            Err(e) => {
                if let Some((index, entry)) = prior {
                    self.store
                        .put_routes(RouteWrite::Restore { entry, index }, table_source, Utc::now());
                }

                guard.settle(MutationPhase::RolledBack);
                let err = CoreError::from_api_with_fallback(e, DELETE_ROUTE_FAILED);
                warn!(cidr = %key, error = %err, "delete route failed, rolled back");
                Err(err)
            }
        }
    }

    /// Save the upstream proxy. Nothing is stored until the daemon accepts it.
    pub async fn save_proxy(&self, request: ProxyRequest) -> Result<ProxyConfig, CoreError> {
        let address = normalize_host_port(&request.address)?;
        let config = ProxyConfig {
            proxy_type: request.proxy_type,
            address: address.to_string(),
            username: request.username.filter(|u| !u.is_empty()),
            password: request.password.filter(|p| !p.is_empty()),
        };

        self.client
            .save_proxy(&ProxyConfigPayload::from(&config))
            .await
            .map_err(|e| CoreError::from_api_with_fallback(e, SAVE_PROXY_FAILED))?;

        self.store.put(config.clone(), Source::Confirmed, Utc::now());
        info!(proxy = %config.url(), "proxy updated");
        Ok(config)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn begin(&self, key: &str) -> Result<SlotGuard, CoreError> {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(_) => {
                debug!(cidr = %key, "mutation rejected, key busy");
                Err(CoreError::Busy { key: key.to_owned() })
            }
            Entry::Vacant(slot) => {
                slot.insert(MutationPhase::Submitting);
                Ok(SlotGuard {
                    slots: Arc::clone(&self.slots),
                    key: key.to_owned(),
                })
            }
        }
    }

    /// Position and entry currently stored for `key`, plus the table's
    /// source so a rollback leaves the table tagged as before.
    fn prior_entry(&self, key: &str) -> (Option<(usize, RouteEntry)>, Source) {
        match self.store.routes() {
            Some(snap) => (
                snap.value.find(key).map(|(index, entry)| (index, entry.clone())),
                snap.source,
            ),
            None => (None, Source::Poll),
        }
    }

    fn known_device_name(&self) -> String {
        self.store
            .device()
            .map(|snap| snap.value.name.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{DeviceStatus, LinkState};

    fn coordinator() -> MutationCoordinator {
        let client = ApiClient::new("http://127.0.0.1:9", &tunsole_api::TransportConfig::default())
            .unwrap();
        MutationCoordinator::new(Arc::new(client), Arc::new(StatusStore::new()))
    }

    #[test]
    fn compose_uses_device_address_without_prefix() {
        let mutations = coordinator();
        mutations.store.put(
            DeviceStatus {
                name: "tunsocks".into(),
                exists: true,
                status: LinkState::Up,
                ip_address: Some("198.18.0.1/16".parse().unwrap()),
                mtu: Some(1500),
            },
            Source::Poll,
            Utc::now(),
        );

        let draft = mutations.compose_route("10.1.2.3", None).unwrap();
        assert_eq!(draft.cidr.to_string(), "10.1.2.3/32");
        assert_eq!(draft.gateway.to_string(), "198.18.0.1");
        assert_eq!(draft.metric, DEFAULT_METRIC);
    }

    #[test]
    fn compose_falls_back_to_default_gateway() {
        let draft = coordinator().compose_route("10.0.0.0/8", Some(5)).unwrap();
        assert_eq!(draft.gateway, DEFAULT_GATEWAY);
        assert_eq!(draft.metric, 5);
    }

    #[test]
    fn busy_slot_rejects_second_mutation_and_frees_on_drop() {
        let mutations = coordinator();
        let guard = mutations.begin("10.0.0.0/8").unwrap();
        assert_eq!(mutations.phase("10.0.0.0/8"), MutationPhase::Submitting);
        assert!(matches!(
            mutations.begin("10.0.0.0/8"),
            Err(CoreError::Busy { .. })
        ));
        assert!(mutations.begin("10.0.0.0/9").is_ok());

        guard.settle(MutationPhase::Confirmed);
        assert_eq!(mutations.phase("10.0.0.0/8"), MutationPhase::Idle);
    }

    #[test]
    fn phase_normalizes_bare_address() {
        let mutations = coordinator();
        let _guard = mutations.begin("192.168.1.5/32").unwrap();
        assert_eq!(mutations.phase("192.168.1.5"), MutationPhase::Submitting);
    }
}
