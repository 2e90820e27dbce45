// ── Domain model ──
//
// Canonical client-side representation of daemon state. Wire quirks (zero
// values standing in for "absent", negative counters) are resolved in
// `convert` so everything here upholds its documented invariants.

pub mod address;
pub mod device;
pub mod proxy;
pub mod route;
pub mod service;

pub use address::{Cidr, Host, HostPort};
pub use device::{DeviceStatus, LinkState};
pub use proxy::{DEFAULT_PROXY_ADDRESS, ProxyConfig, ProxyType};
pub use route::Route;
pub use service::{ServiceStatus, TrafficStats};
