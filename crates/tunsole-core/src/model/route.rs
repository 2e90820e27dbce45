// ── Route domain type ──

use serde::{Deserialize, Serialize};

/// A route the daemon installed on the TUN device.
///
/// `cidr` is the unique key within a route table. `gateway` and `device`
/// may be empty: the kernel reports no gateway for on-link routes, and a
/// route submitted before the device name is known has no device yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub cidr: String,
    pub gateway: String,
    pub device: String,
    /// Lower wins.
    pub metric: u32,
}
