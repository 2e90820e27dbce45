//! Login / logout handlers.

use secrecy::SecretString;
use tunsole_core::Session;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

pub async fn handle(args: LoginArgs, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    // Only an explicit token is validated; a stored one is what we replace.
    let token = match global.token.as_deref().filter(|t| !t.is_empty()) {
        Some(t) => SecretString::from(t.to_owned()),
        None => util::prompt_secret("Token: ", "token")?,
    };

    let endpoint = target.session.endpoint.clone();
    let session = Session::new(target.session)?;

    let spinner = util::spinner(&format!("Validating token with {endpoint}"), global.quiet);
    let result = session.login(&token).await;
    spinner.finish_and_clear();
    let grant = result?;

    let granted = if grant.token.is_empty() {
        token
    } else {
        SecretString::from(grant.token.clone())
    };

    let expiry = if grant.expires_in > 0 {
        let secs = u64::try_from(grant.expires_in).unwrap_or_default();
        format!("expires in {}", output::format_uptime(secs))
    } else {
        "does not expire".to_owned()
    };

    if args.no_store {
        output::notice(&format!("Token accepted by {endpoint} ({expiry})"), global.quiet);
        return Ok(());
    }

    tunsole_config::store_token(&target.profile_name, &granted)?;
    output::notice(
        &format!(
            "Logged in to {endpoint} as profile '{}' ({expiry}); token stored in the system keyring",
            target.profile_name
        ),
        global.quiet,
    );
    Ok(())
}

/// Drop the keyring entry. Tokens held in `token` or `token_env` are left
/// alone since the CLI does not own them.
pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = tunsole_config::load_config()?;
    let (profile_name, profile) = util::select_profile(&cfg, global)?;

    if tunsole_config::delete_token(&profile_name)? {
        output::notice(
            &format!("Removed stored token for profile '{profile_name}'"),
            global.quiet,
        );
    } else {
        output::notice(
            &format!("No stored token for profile '{profile_name}'"),
            global.quiet,
        );
    }

    if profile.token.is_some() {
        output::notice(
            "The profile still carries a plaintext token; remove it from the config file.",
            global.quiet,
        );
    }
    Ok(())
}
