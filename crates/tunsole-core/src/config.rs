// ── Runtime session configuration ──
//
// Describes *how* to talk to a daemon: endpoint, credentials, cadence and
// reconnect tuning. Never touches disk; tunsole-config builds one from a
// profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Daemon address when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9090";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). The daemon usually speaks plain HTTP on
    /// loopback, so this only matters behind a TLS proxy.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Reconnect and liveness tuning for the service event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay, jitter included. Default: 30s.
    pub max_delay: Duration,
    /// A connected stream that stays silent this long is treated as lost.
    /// Default: 30s.
    pub idle_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Polling cadence per resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Device status cadence. Default: 5s.
    pub device_interval: Duration,
    /// Service, proxy and routes cadence. Default: 30s.
    pub slow_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            device_interval: Duration::from_secs(5),
            slow_interval: Duration::from_secs(30),
        }
    }
}

/// Everything a [`Session`](crate::Session) needs to run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Url,
    /// Bearer token. `None` talks to daemons running without auth.
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// Per-request timeout for REST calls.
    pub timeout: Duration,
    pub poll: PollConfig,
    /// Open the service event stream after the initial load.
    pub push_enabled: bool,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            poll: PollConfig::default(),
            push_enabled: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}
