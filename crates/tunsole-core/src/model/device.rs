// ── TUN device domain types ──

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Operational state of the TUN link.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LinkState {
    Up,
    Down,
    #[default]
    Unknown,
}

/// Status of the virtual network interface the daemon routes through.
///
/// `status`, `ip_address` and `mtu` only carry information while
/// `exists` is true; otherwise they are `Unknown`/`None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub name: String,
    pub exists: bool,
    pub status: LinkState,
    pub ip_address: Option<IpNet>,
    pub mtu: Option<u32>,
}

impl DeviceStatus {
    pub fn is_up(&self) -> bool {
        self.exists && self.status == LinkState::Up
    }
}
