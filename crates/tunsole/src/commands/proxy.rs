//! Proxy command handlers.

use secrecy::ExposeSecret;
use tunsole_core::{ProxyConfig, ProxyRequest, ProxyType, normalize_host_port};

use crate::cli::{GlobalOpts, ProxyArgs, ProxyCommand, ProxyKind};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

impl From<ProxyKind> for ProxyType {
    fn from(kind: ProxyKind) -> Self {
        match kind {
            ProxyKind::Socks5 => ProxyType::Socks5,
            ProxyKind::Socks4 => ProxyType::Socks4,
            ProxyKind::Http => ProxyType::Http,
            ProxyKind::Https => ProxyType::Https,
        }
    }
}

fn detail(p: &ProxyConfig) -> String {
    let mut lines = vec![
        format!("Type:     {}", p.proxy_type),
        format!("Address:  {}", p.address),
    ];
    if let Some(ref user) = p.username {
        lines.push(format!("Username: {user}"));
    }
    if p.password.is_some() {
        lines.push("Password: ****".into());
    }
    lines.join("\n")
}

pub async fn handle(args: ProxyArgs, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    let proxy = match args.command {
        ProxyCommand::Show => {
            util::oneshot(target, |session| async move {
                Ok(session
                    .store()
                    .proxy()
                    .map(|s| (*s.value).clone())
                    .unwrap_or_default())
            })
            .await?
        }

        ProxyCommand::Set {
            proxy_type,
            address,
            username,
            password,
        } => {
            normalize_host_port(&address)?;

            let username = username.filter(|u| !u.is_empty());
            let password = match (&username, password) {
                (Some(_), None) => Some(
                    util::prompt_secret("Proxy password: ", "password")?
                        .expose_secret()
                        .to_owned(),
                ),
                (_, password) => password.filter(|p| !p.is_empty()),
            };

            let request = ProxyRequest {
                proxy_type: proxy_type.into(),
                address,
                username,
                password,
            };
            util::oneshot(target, |session| async move {
                session.mutations().save_proxy(request).await
            })
            .await?
        }
    };

    let out = output::render_single(global.output, &proxy, detail, ProxyConfig::url)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
