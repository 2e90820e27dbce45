//! Shared configuration for the tunsole console.
//!
//! TOML profiles, token resolution (flag, environment, keyring, plaintext)
//! and translation to `tunsole_core::SessionConfig`. The CLI layers its
//! global flags on top of what is resolved here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tunsole_core::{
    DEFAULT_ENDPOINT, PollConfig, ReconnectConfig, SessionConfig, TlsVerification,
};

/// Keyring service name; entries are `<profile>/token`.
pub const KEYRING_SERVICE: &str = "tunsole";

/// Environment variable consulted after a profile's own `token_env`.
pub const TOKEN_ENV: &str = "TUNSOLE_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not defined")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named daemon profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Pick the profile to use: `requested`, else `default_profile`, else
    /// `"default"`. An unconfigured implicit profile falls back to the
    /// local daemon; an explicitly requested one must exist.
    pub fn resolve_profile(&self, requested: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile.clone())),
            None if requested.is_some() => Err(ConfigError::UnknownProfile { profile: name }),
            None => Ok((name, Profile::default())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

/// A named daemon profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Daemon base URL (e.g., "http://127.0.0.1:9090").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Token in plaintext. Prefer the keyring or `token_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Override the default request timeout (seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_poll_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_poll_secs: Option<u64>,

    /// Follow the service event stream. Default: true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_base_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_cap_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_idle_secs: Option<u64>,

    /// Custom CA certificate for daemons behind a TLS proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            token_env: None,
            timeout: None,
            device_poll_secs: None,
            slow_poll_secs: None,
            push: None,
            reconnect_base_ms: None,
            reconnect_cap_secs: None,
            stream_idle_secs: None,
            ca_cert: None,
            insecure: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tunsole", "tunsole").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tunsole");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered as defaults → file → `TUNSOLE_` environment.
/// Nested keys use `__` (e.g. `TUNSOLE_DEFAULTS__OUTPUT=json`). A missing
/// file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TUNSOLE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Where secrets come from outside the config file.
pub trait SecretSource {
    fn env(&self, name: &str) -> Option<String>;
    fn keyring(&self, profile_name: &str) -> Option<String>;
}

/// Process environment and the platform keyring.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSecrets;

impl SecretSource for SystemSecrets {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    fn keyring(&self, profile_name: &str) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)).ok()?;
        match entry.get_password() {
            Ok(secret) => Some(secret),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(error = %e, profile = profile_name, "keyring lookup failed");
                None
            }
        }
    }
}

/// Resolve the token for a profile from the system sources.
///
/// `None` is not an error: daemons running without auth accept
/// unauthenticated requests.
pub fn resolve_token(
    profile: &Profile,
    profile_name: &str,
    flag: Option<&str>,
) -> Option<SecretString> {
    resolve_token_from(profile, profile_name, flag, &SystemSecrets)
}

/// Token chain: flag → profile `token_env` → `TUNSOLE_TOKEN` → keyring →
/// plaintext `token`.
pub fn resolve_token_from(
    profile: &Profile,
    profile_name: &str,
    flag: Option<&str>,
    secrets: &impl SecretSource,
) -> Option<SecretString> {
    flag.filter(|t| !t.is_empty())
        .map(str::to_owned)
        .or_else(|| profile.token_env.as_deref().and_then(|name| secrets.env(name)))
        .or_else(|| secrets.env(TOKEN_ENV))
        .or_else(|| secrets.keyring(profile_name))
        .or_else(|| profile.token.clone().filter(|t| !t.is_empty()))
        .map(SecretString::from)
}

/// Store a token in the system keyring under `<profile>/token`.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    use secrecy::ExposeSecret;

    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(token.expose_secret())?;
    Ok(())
}

/// Remove the stored token. Returns `false` when there was none.
pub fn delete_token(profile_name: &str) -> Result<bool, ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    match entry.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

// ── SessionConfig translation ───────────────────────────────────────

/// Build a `SessionConfig` from a profile and an already-resolved token.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
    token: Option<SecretString>,
) -> Result<SessionConfig, ConfigError> {
    let endpoint: url::Url = profile
        .endpoint
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", profile.endpoint),
        })?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected http or https, got '{}'", endpoint.scheme()),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let poll_defaults = PollConfig::default();
    let reconnect_defaults = ReconnectConfig::default();

    let mut cfg = SessionConfig::new(endpoint);
    cfg.token = token;
    cfg.tls = tls;
    cfg.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    cfg.push_enabled = profile.push.unwrap_or(true);
    cfg.poll = PollConfig {
        device_interval: profile
            .device_poll_secs
            .map_or(poll_defaults.device_interval, Duration::from_secs),
        slow_interval: profile
            .slow_poll_secs
            .map_or(poll_defaults.slow_interval, Duration::from_secs),
    };
    cfg.reconnect = ReconnectConfig {
        initial_delay: profile
            .reconnect_base_ms
            .map_or(reconnect_defaults.initial_delay, Duration::from_millis),
        max_delay: profile
            .reconnect_cap_secs
            .map_or(reconnect_defaults.max_delay, Duration::from_secs),
        idle_timeout: profile
            .stream_idle_secs
            .map_or(reconnect_defaults.idle_timeout, Duration::from_secs),
    };

    for (field, value) in [
        ("device_poll_secs", cfg.poll.device_interval),
        ("slow_poll_secs", cfg.poll.slow_interval),
    ] {
        if value.is_zero() {
            return Err(ConfigError::Validation {
                field: field.into(),
                reason: "must be greater than zero".into(),
            });
        }
    }

    Ok(cfg)
}
