// ── Upstream proxy domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Proxy the daemon ships configured with.
pub const DEFAULT_PROXY_ADDRESS: &str = "127.0.0.1:7891";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum ProxyType {
    #[default]
    Socks5,
    Socks4,
    Http,
    Https,
}

/// Upstream proxy the daemon forwards through.
///
/// The daemon never echoes credentials back, so `username`/`password` are
/// only populated after a local save. `password` is skipped by both
/// `Debug` and `Serialize`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    /// `host:port`
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_type: ProxyType::Socks5,
            address: DEFAULT_PROXY_ADDRESS.to_owned(),
            username: None,
            password: None,
        }
    }
}

impl ProxyConfig {
    /// `type://address`, the form the daemon reports as the active proxy.
    pub fn url(&self) -> String {
        format!("{}://{}", self.proxy_type, self.address)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("proxy_type", &self.proxy_type)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
