use thiserror::Error;

/// Top-level error type for the `tunsole-api` crate.
///
/// Covers every failure mode of the control API surface:
/// authentication, transport, envelope rejection, and the event stream.
/// `tunsole-core` maps these into its reconciliation taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token missing, expired, or rejected by the daemon (HTTP 401/403).
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Daemon ──────────────────────────────────────────────────────
    /// Non-2xx status or `success: false` envelope. `message` is the
    /// daemon's text verbatim when it sent one.
    #[error(
        "Request rejected by daemon{}: {}",
        .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default(),
        .message.as_deref().unwrap_or("no message")
    )]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },

    // ── Event stream ────────────────────────────────────────────────
    /// The service event stream failed mid-read.
    #[error("Event stream error: {0}")]
    Stream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the daemon refused our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll or reconnect.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Timeout { .. } | Self::Stream(_) => true,
            Self::Rejected { status, .. } => status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }

    /// The daemon-provided message, if this is a rejection that carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
