// Control API wire types
//
// Every endpoint wraps its payload in the `ApiResponse<T>` envelope. Fields
// use `#[serde(default)]` liberally because the daemon omits zero values on
// some paths (e.g. `GET /proxy` never returns credentials).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard control API response envelope.
///
/// ```json
/// { "success": true, "message": "Device status retrieved", "data": { ... } }
/// ```
///
/// Error responses may carry only `{ "message": "..." }`, so `success`
/// defaults to `false` and `data` is optional.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Bare `{ "message": "..." }` body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

// ── Device ───────────────────────────────────────────────────────────

/// TUN device status from `GET /device`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exists: bool,
    /// `"up"`, `"down"`, or anything else the kernel reports.
    #[serde(default)]
    pub status: String,
    /// Interface address in CIDR form, e.g. `198.18.0.1/15`.
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub mtu: i64,
}

// ── Service ──────────────────────────────────────────────────────────

/// Engine status from `GET /service` and each `/service/events` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusResponse {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: i64,
    /// Seconds since the engine started.
    #[serde(default)]
    pub uptime: i64,
    #[serde(default)]
    pub connections: i64,
    /// Bytes of heap in use by the daemon.
    #[serde(default)]
    pub memory_usage: i64,
    #[serde(default)]
    pub cpu_usage: f64,
    /// Active proxy address, without scheme.
    #[serde(default)]
    pub proxy: String,
    #[serde(default)]
    pub traffic: Option<TrafficStatsResponse>,
    /// Emission time, when the daemon stamps its events.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficStatsResponse {
    #[serde(default)]
    pub upload_bytes: i64,
    #[serde(default)]
    pub download_bytes: i64,
    #[serde(default)]
    pub upload_speed: i64,
    #[serde(default)]
    pub download_speed: i64,
}

// ── Proxy ────────────────────────────────────────────────────────────

/// Upstream proxy configuration, read by `GET /proxy` and written by
/// `POST /proxy`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfigPayload {
    /// `socks5`, `socks4`, `http`, or `https`.
    #[serde(rename = "type", default)]
    pub proxy_type: String,
    /// `host:port`
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for ProxyConfigPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfigPayload")
            .field("proxy_type", &self.proxy_type)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Routes ───────────────────────────────────────────────────────────

/// A kernel route entry from `GET /routes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub cidr: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub metric: i64,
}

/// Body for `POST /routes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddRouteRequest {
    pub cidr: String,
    pub gateway: String,
    pub metric: i64,
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub token: &'a str,
}

/// Login grant from `POST /auth/login`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub token: String,
    /// Seconds until expiry; `0` means the token never expires.
    #[serde(default)]
    pub expires_in: i64,
}

impl fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGrant")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn service_status_tolerates_missing_fields() {
        let body = r#"{"running":false,"proxy":"127.0.0.1:7891","traffic":{}}"#;
        let status: ServiceStatusResponse = serde_json::from_str(body).unwrap();
        assert!(!status.running);
        assert_eq!(status.pid, 0);
        assert_eq!(status.traffic, Some(TrafficStatsResponse::default()));
        assert!(status.timestamp.is_none());
    }

    #[test]
    fn envelope_without_data_parses() {
        let body = r#"{"message":"Unauthorized"}"#;
        let env: ApiResponse<RouteResponse> = serde_json::from_str(body).unwrap();
        assert!(!env.success);
        assert_eq!(env.message.as_deref(), Some("Unauthorized"));
        assert!(env.data.is_none());
    }

    #[test]
    fn proxy_debug_redacts_password() {
        let cfg = ProxyConfigPayload {
            proxy_type: "socks5".into(),
            address: "127.0.0.1:7891".into(),
            username: Some("alice".into()),
            password: Some("hunter2".into()),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn proxy_serializes_type_and_skips_empty_credentials() {
        let cfg = ProxyConfigPayload {
            proxy_type: "http".into(),
            address: "proxy.lan:3128".into(),
            username: None,
            password: None,
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "http", "address": "proxy.lan:3128" })
        );
    }
}
