// ── Core error types ──
//
// User-facing errors from tunsole-core. Consumers never see raw HTTP
// statuses or JSON parse failures; the `From<tunsole_api::Error>` impl
// folds transport-layer errors into the reconciliation taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local validation ─────────────────────────────────────────────
    /// User input rejected before any request was made.
    #[error("Invalid {field} '{input}': {reason}")]
    InvalidAddress {
        field: &'static str,
        input: String,
        reason: String,
    },

    /// A mutation for this key is already in flight.
    #[error("A change to {key} is already in progress")]
    Busy { key: String },

    // ── Daemon responses ─────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Unauthenticated { message: String },

    #[error("No token available -- run `tunsole login` first")]
    NotLoggedIn,

    /// Non-success envelope or HTTP error; `message` is the daemon's text
    /// when it sent one.
    #[error("{message}")]
    ServerRejected { message: String, status: Option<u16> },

    /// Network or timeout failure; retried by the poll/push schedule.
    #[error("Temporary failure: {reason}")]
    Transient { reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid(field: &'static str, input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            field,
            input: input.to_owned(),
            reason: reason.into(),
        }
    }

    /// Failures the poll/push schedule will retry on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::ServerRejected { status, .. } => status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. } | Self::NotLoggedIn)
    }

    /// Translate an API error, substituting `fallback` when the daemon
    /// rejected the request without saying why.
    pub(crate) fn from_api_with_fallback(err: tunsole_api::Error, fallback: &str) -> Self {
        match err {
            tunsole_api::Error::Rejected {
                status,
                message: None,
            } => Self::ServerRejected {
                message: fallback.to_owned(),
                status,
            },
            other => other.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tunsole_api::Error> for CoreError {
    fn from(err: tunsole_api::Error) -> Self {
        match err {
            tunsole_api::Error::Unauthorized { message } => CoreError::Unauthenticated { message },
            tunsole_api::Error::Rejected { status, message } => CoreError::ServerRejected {
                message: message.unwrap_or_else(|| match status {
                    Some(code) => format!("Request rejected by daemon (HTTP {code})"),
                    None => "Request rejected by daemon".into(),
                }),
                status,
            },
            tunsole_api::Error::Transport(e) => CoreError::Transient {
                reason: e.to_string(),
            },
            tunsole_api::Error::Timeout { timeout_secs } => CoreError::Transient {
                reason: format!("request timed out after {timeout_secs}s"),
            },
            tunsole_api::Error::Stream(reason) => CoreError::Transient { reason },
            tunsole_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            tunsole_api::Error::Tls(message) => CoreError::Config { message },
            tunsole_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected response from daemon: {message}"))
            }
        }
    }
}
