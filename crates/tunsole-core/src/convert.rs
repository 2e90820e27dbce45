// ── API-to-domain type conversions ──
//
// Bridges raw `tunsole_api` response types into canonical domain types.
// The daemon encodes "absent" as zero or empty string; every conversion
// here turns those into `None` and enforces the presence invariants.

use ipnet::IpNet;
use tracing::debug;

use crate::model::{DeviceStatus, LinkState, ProxyConfig, ProxyType, Route, ServiceStatus, TrafficStats};

// ── Helpers ──────────────────────────────────────────────────────────

/// Negative wire integers clamp to zero.
fn non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

/// Zero and negative wire integers become `None`.
fn positive_u32(v: i64) -> Option<u32> {
    u32::try_from(v).ok().filter(|n| *n > 0)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

// ── Device ───────────────────────────────────────────────────────────

impl From<tunsole_api::DeviceStatusResponse> for DeviceStatus {
    fn from(d: tunsole_api::DeviceStatusResponse) -> Self {
        if !d.exists {
            return Self {
                name: d.name,
                exists: false,
                status: LinkState::Unknown,
                ip_address: None,
                mtu: None,
            };
        }

        let ip_address = non_empty(d.ip_address).and_then(|raw| match raw.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(e) => {
                debug!(ip = %raw, error = %e, "ignoring unparseable device address");
                None
            }
        });

        Self {
            name: d.name,
            exists: true,
            status: d.status.parse().unwrap_or(LinkState::Unknown),
            ip_address,
            mtu: positive_u32(d.mtu),
        }
    }
}

// ── Service ──────────────────────────────────────────────────────────

impl From<tunsole_api::TrafficStatsResponse> for TrafficStats {
    fn from(t: tunsole_api::TrafficStatsResponse) -> Self {
        Self {
            upload_bytes: non_negative(t.upload_bytes),
            download_bytes: non_negative(t.download_bytes),
            upload_speed: non_negative(t.upload_speed),
            download_speed: non_negative(t.download_speed),
        }
    }
}

impl From<tunsole_api::ServiceStatusResponse> for ServiceStatus {
    fn from(s: tunsole_api::ServiceStatusResponse) -> Self {
        let proxy = non_empty(s.proxy);

        if !s.running {
            return Self {
                running: false,
                proxy,
                ..Self::default()
            };
        }

        Self {
            running: true,
            pid: positive_u32(s.pid),
            uptime: Some(non_negative(s.uptime)),
            traffic: Some(s.traffic.map(TrafficStats::from).unwrap_or_default()),
            connections: Some(non_negative(s.connections)),
            memory_usage: Some(non_negative(s.memory_usage)),
            cpu_usage: Some(s.cpu_usage.max(0.0)),
            proxy,
        }
    }
}

// ── Proxy ────────────────────────────────────────────────────────────

impl From<tunsole_api::ProxyConfigPayload> for ProxyConfig {
    fn from(p: tunsole_api::ProxyConfigPayload) -> Self {
        let proxy_type = p.proxy_type.parse().unwrap_or_else(|_| {
            debug!(proxy_type = %p.proxy_type, "unknown proxy type, assuming socks5");
            ProxyType::default()
        });

        Self {
            proxy_type,
            address: p.address,
            username: p.username.and_then(non_empty),
            password: p.password.and_then(non_empty),
        }
    }
}

impl From<&ProxyConfig> for tunsole_api::ProxyConfigPayload {
    fn from(p: &ProxyConfig) -> Self {
        Self {
            proxy_type: p.proxy_type.to_string(),
            address: p.address.clone(),
            username: p.username.clone(),
            password: p.password.clone(),
        }
    }
}

// ── Routes ───────────────────────────────────────────────────────────

impl From<tunsole_api::RouteResponse> for Route {
    fn from(r: tunsole_api::RouteResponse) -> Self {
        Self {
            cidr: r.cidr,
            gateway: r.gateway,
            device: r.device,
            metric: u32::try_from(r.metric).unwrap_or(0),
        }
    }
}
