// ── Engine service domain types ──

use serde::{Deserialize, Serialize};

/// Cumulative counters and instantaneous rates for proxied traffic.
///
/// `upload_bytes`/`download_bytes` never decrease within one engine run;
/// a decrease means the engine restarted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficStats {
    pub upload_bytes: u64,
    pub download_bytes: u64,
    /// Bytes per second, as reported by the daemon.
    pub upload_speed: u64,
    pub download_speed: u64,
}

impl TrafficStats {
    /// True when either cumulative counter went backwards since `previous`.
    pub fn is_reset_from(&self, previous: &TrafficStats) -> bool {
        self.upload_bytes < previous.upload_bytes || self.download_bytes < previous.download_bytes
    }
}

/// Engine status. Every optional field except `proxy` is present exactly
/// when `running` is true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Seconds since the engine started.
    pub uptime: Option<u64>,
    pub traffic: Option<TrafficStats>,
    pub connections: Option<u64>,
    /// Daemon heap usage in bytes.
    pub memory_usage: Option<u64>,
    pub cpu_usage: Option<f64>,
    /// Active upstream proxy address.
    pub proxy: Option<String>,
}
