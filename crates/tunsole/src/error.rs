//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use tunsole_config::ConfigError;
use tunsole_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the daemon: {reason}")]
    #[diagnostic(
        code(tunsole::connection_failed),
        help(
            "Check that the daemon is running and listening on the configured endpoint.\n\
             Try: tunsole status --endpoint http://127.0.0.1:9090"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out: {reason}")]
    #[diagnostic(
        code(tunsole::timeout),
        help("Increase the timeout with --timeout or check daemon responsiveness.")
    )]
    Timeout { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(tunsole::auth_failed),
        help(
            "The daemon rejected the token.\n\
             Run: tunsole login"
        )
    )]
    AuthFailed { message: String },

    #[error("The daemon requires a token and none is configured")]
    #[diagnostic(
        code(tunsole::not_logged_in),
        help(
            "Run: tunsole login\n\
             Or pass --token, or set TUNSOLE_TOKEN."
        )
    )]
    NotLoggedIn,

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(tunsole::not_found),
        help("Run: tunsole {list_command} to see what is configured")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("A change to {key} is already in progress")]
    #[diagnostic(
        code(tunsole::busy),
        help("Wait for the pending change to finish, then retry.")
    )]
    Busy { key: String },

    // ── Daemon ───────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(tunsole::rejected))]
    Rejected { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(tunsole::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tunsole::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(tunsole::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: tunsole config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(tunsole::config),
        help("Inspect the file with: tunsole config show")
    )]
    Config { message: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(
        code(tunsole::keyring),
        help("Set token_env in the profile or pass --token instead of using the keyring.")
    )]
    Keyring { reason: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("'{action}' requires confirmation")]
    #[diagnostic(
        code(tunsole::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML output failed: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NotLoggedIn => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Busy { .. } => exit_code::CONFLICT,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAddress {
                field,
                input,
                reason,
            } => CliError::Validation {
                field: field.into(),
                reason: format!("'{input}': {reason}"),
            },

            CoreError::Busy { key } => CliError::Busy { key },

            CoreError::Unauthenticated { message } => CliError::AuthFailed { message },

            CoreError::NotLoggedIn => CliError::NotLoggedIn,

            CoreError::ServerRejected { message, .. } => CliError::Rejected { message },

            // The transport folds timeouts into transient failures; the
            // reason text is the only thing telling them apart.
            CoreError::Transient { reason } if reason.contains("timed out") => {
                CliError::Timeout { reason }
            }
            CoreError::Transient { reason } => CliError::ConnectionFailed { reason },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            ConfigError::Keyring(e) => CliError::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::InvalidAddress {
                    field: "cidr",
                    input: "10.0.0.0/33".into(),
                    reason: "prefix too long".into(),
                },
                exit_code::USAGE,
            ),
            (CoreError::Busy { key: "10.0.0.0/8".into() }, exit_code::CONFLICT),
            (CoreError::NotLoggedIn, exit_code::AUTH),
            (
                CoreError::Unauthenticated {
                    message: "Unauthorized".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::Transient {
                    reason: "connection refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Transient {
                    reason: "request timed out after 10s".into(),
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::ServerRejected {
                    message: "Failed to add route".into(),
                    status: Some(500),
                },
                exit_code::GENERAL,
            ),
        ];

        for (core, expected) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), expected, "{label}");
        }
    }

    #[test]
    fn rejection_message_is_shown_verbatim() {
        let err = CliError::from(CoreError::ServerRejected {
            message: "Invalid CIDR format".into(),
            status: Some(400),
        });
        assert_eq!(err.to_string(), "Invalid CIDR format");
    }

    #[test]
    fn unknown_profile_is_a_usage_error() {
        let err = CliError::from(ConfigError::UnknownProfile {
            profile: "lab".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
