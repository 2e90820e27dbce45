//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use secrecy::SecretString;
use tunsole_config::Config;
use tunsole_core::DEFAULT_ENDPOINT;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    for profile in out.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("****".into());
        }
    }
    out
}

fn render_config(cfg: &Config, format: OutputFormat) -> Result<String, CliError> {
    let masked = redacted(cfg);
    Ok(match format {
        OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&masked)?,
        OutputFormat::Json => serde_json::to_string_pretty(&masked)?,
        OutputFormat::JsonCompact => serde_json::to_string(&masked)?,
        OutputFormat::Yaml => serde_yaml::to_string(&masked)?,
    })
}

/// Where a token entered during `init` ends up.
enum TokenPlacement {
    Keyring(SecretString),
    Plaintext(String),
    None,
}

struct InitAnswers {
    name: String,
    endpoint: String,
    push: bool,
    token: TokenPlacement,
}

fn prompt_init(
    name: Option<String>,
    url: Option<String>,
    no_push: bool,
) -> Result<InitAnswers, CliError> {
    let name: String = Input::new()
        .with_prompt("Profile name")
        .default(name.unwrap_or_else(|| "default".into()))
        .interact_text()
        .map_err(util::prompt_err)?;

    let endpoint: String = Input::new()
        .with_prompt("Daemon URL")
        .default(url.unwrap_or_else(|| DEFAULT_ENDPOINT.into()))
        .interact_text()
        .map_err(util::prompt_err)?;

    let push = Confirm::new()
        .with_prompt("Follow the service event stream?")
        .default(!no_push)
        .interact()
        .map_err(util::prompt_err)?;

    let raw = rpassword::prompt_password("Token (leave empty if the daemon has no auth): ")
        .map_err(util::prompt_err)?;
    let raw = raw.trim().to_owned();

    let token = if raw.is_empty() {
        TokenPlacement::None
    } else {
        let choices = &[
            "Store in system keyring (recommended)",
            "Save to config file (plaintext)",
        ];
        let selection = Select::new()
            .with_prompt("Where to store the token?")
            .items(choices)
            .default(0)
            .interact()
            .map_err(util::prompt_err)?;
        if selection == 0 {
            TokenPlacement::Keyring(SecretString::from(raw))
        } else {
            TokenPlacement::Plaintext(raw)
        }
    };

    Ok(InitAnswers {
        name,
        endpoint,
        push,
        token,
    })
}

fn init(
    name: Option<String>,
    url: Option<String>,
    no_push: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut cfg = tunsole_config::load_config()?;
    let name = name.or_else(|| global.profile.clone());
    let url = url.or_else(|| global.endpoint.clone());

    let answers = if global.yes {
        InitAnswers {
            name: name.unwrap_or_else(|| "default".into()),
            endpoint: url.unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            push: !no_push,
            token: global
                .token
                .clone()
                .filter(|t| !t.is_empty())
                .map_or(TokenPlacement::None, |t| {
                    TokenPlacement::Keyring(SecretString::from(t))
                }),
        }
    } else {
        output::notice(
            &format!(
                "tunsole configuration\n   Config path: {}\n",
                tunsole_config::config_path().display()
            ),
            global.quiet,
        );
        prompt_init(name, url, no_push)?
    };

    let mut profile = cfg.profiles.get(&answers.name).cloned().unwrap_or_default();
    profile.endpoint = answers.endpoint;
    profile.push = if answers.push { None } else { Some(false) };
    if let TokenPlacement::Plaintext(ref token) = answers.token {
        profile.token = Some(token.clone());
    }

    // Validate before anything is written.
    tunsole_config::profile_to_session_config(&profile, &cfg.defaults, None)?;

    if let TokenPlacement::Keyring(ref token) = answers.token {
        tunsole_config::store_token(&answers.name, token)?;
        output::notice("   token stored in system keyring", global.quiet);
    }

    if cfg.profiles.is_empty() || cfg.default_profile.is_none() {
        cfg.default_profile = Some(answers.name.clone());
    }
    cfg.profiles.insert(answers.name.clone(), profile);

    let path = tunsole_config::save_config(&cfg)?;
    output::notice(
        &format!("Saved profile '{}' to {}", answers.name, path.display()),
        global.quiet,
    );
    Ok(())
}

fn set_token(value: Option<String>, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = tunsole_config::load_config()?;
    let (profile_name, _) = util::select_profile(&cfg, global)?;

    let token = match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => SecretString::from(v.trim().to_owned()),
        None => util::prompt_secret("Token: ", "token")?,
    };

    tunsole_config::store_token(&profile_name, &token)?;
    output::notice(
        &format!("Token stored in system keyring for profile '{profile_name}'"),
        global.quiet,
    );
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { name, url, no_push } => init(name, url, no_push, global),

        ConfigCommand::Show => {
            let cfg = tunsole_config::load_config()?;
            let out = render_config(&cfg, global.output)?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &tunsole_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::SetToken { value } => set_token(value, global),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tunsole_config::Profile;

    use super::*;

    #[test]
    fn show_masks_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                endpoint: "http://10.1.1.1:9090".into(),
                token: Some("hunter2".into()),
                ..Profile::default()
            },
        );

        let text = render_config(&cfg, OutputFormat::Table).unwrap();
        assert!(text.contains("token = \"****\""), "{text}");
        assert!(!text.contains("hunter2"));

        let json = render_config(&cfg, OutputFormat::JsonCompact).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
