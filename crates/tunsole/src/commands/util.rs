//! Shared helpers for command handlers.

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use tunsole_config::{Config, ConfigError};
use tunsole_core::{CoreError, Session, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile name plus the session settings built from it.
#[derive(Debug)]
pub struct Target {
    pub profile_name: String,
    pub session: SessionConfig,
}

/// Load the config file, pick the profile and apply CLI overrides.
pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = tunsole_config::load_config()?;
    let (profile_name, mut profile) = select_profile(&cfg, global)?;

    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let token = tunsole_config::resolve_token(&profile, &profile_name, global.token.as_deref());
    tracing::debug!(
        profile = %profile_name,
        endpoint = %profile.endpoint,
        has_token = token.is_some(),
        "resolved target"
    );

    let session = tunsole_config::profile_to_session_config(&profile, &cfg.defaults, token)?;
    Ok(Target {
        profile_name,
        session,
    })
}

/// `resolve_profile`, with the known profile names filled into the error.
pub fn select_profile(
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(String, tunsole_config::Profile), CliError> {
    cfg.resolve_profile(global.profile.as_deref())
        .map_err(|e| match e {
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: available_profiles(cfg),
            },
            other => other.into(),
        })
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Run `f` against a session that is started first and logged out after.
pub async fn oneshot<F, Fut, T>(target: Target, f: F) -> Result<T, CliError>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    Ok(Session::oneshot(target.session, f).await?)
}

// ── Interaction ─────────────────────────────────────────────────────

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool, action: &str) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(std::io::Error::other)?;
    Ok(confirmed)
}

/// Read a secret without echo. Empty input is a validation error.
pub fn prompt_secret(prompt: &str, field: &str) -> Result<SecretString, CliError> {
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "no value given and stdin is not a terminal".into(),
        });
    }
    let value = rpassword::prompt_password(prompt)?;
    if value.trim().is_empty() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "cannot be empty".into(),
        });
    }
    Ok(SecretString::from(value.trim().to_owned()))
}

/// Map a dialoguer failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Stderr spinner, hidden when quiet or not attached to a terminal.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_owned());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
