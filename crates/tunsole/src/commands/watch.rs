//! Live view: keeps a session running and prints every applied update.

use std::fmt::Write as _;

use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tunsole_core::{
    ResourceKey, ResourceUpdate, ResourceValue, Session, SessionState, TrafficRates,
};

use crate::cli::{GlobalOpts, OutputFormat, ResourceArg, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util::Target;

impl From<ResourceArg> for ResourceKey {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Device => ResourceKey::Device,
            ResourceArg::Service => ResourceKey::Service,
            ResourceArg::Proxy => ResourceKey::Proxy,
            ResourceArg::Routes => ResourceKey::Routes,
        }
    }
}

/// One-line summary of a stored value.
fn summarize(value: &ResourceValue, rates: Option<TrafficRates>) -> String {
    match value {
        ResourceValue::Device(d) if d.exists => format!(
            "{} {} {}",
            d.name,
            d.status,
            d.ip_address.map_or_else(|| "-".into(), |ip| ip.to_string())
        ),
        ResourceValue::Device(d) => format!("{} absent", d.name),
        ResourceValue::Service(s) if s.running => {
            let mut line = format!("running pid={}", s.pid.unwrap_or_default());
            if let Some(conns) = s.connections {
                let _ = write!(line, " conns={conns}");
            }
            if let Some(r) = rates {
                let _ = write!(
                    line,
                    " up={} down={}",
                    output::format_rate(r.upload_bps),
                    output::format_rate(r.download_bps)
                );
            }
            line
        }
        ResourceValue::Service(_) => "stopped".into(),
        ResourceValue::Proxy(p) => p.url(),
        ResourceValue::Routes(t) => {
            let cidrs: Vec<&str> = t.routes().map(|r| r.cidr.as_str()).collect();
            format!("{} route(s): {}", t.len(), cidrs.join(", "))
        }
    }
}

fn render_update(
    update: &ResourceUpdate,
    rates: Option<TrafficRates>,
    format: OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table | OutputFormat::Plain => {
            let stamp = update.observed_at.format("%H:%M:%S%.3f").to_string();
            let resource = update.resource.to_string();
            let source = update.source.to_string();
            format!(
                "{} {resource:<8} {source:<10} {}",
                output::dim(&stamp, color),
                summarize(&update.value, rates)
            )
        }
        // A stream of documents, so pretty JSON would be unreadable.
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(update)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(update)?),
    })
}

pub async fn handle(args: WatchArgs, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = target.session;
    if args.no_push {
        config.push_enabled = false;
    }

    let keys: Vec<ResourceKey> = if args.resource.is_empty() {
        ResourceKey::iter().collect()
    } else {
        args.resource.iter().copied().map(ResourceKey::from).collect()
    };

    let session = Session::new(config)?;
    session.start().await?;

    let result = follow(&session, &keys, global).await;
    session.logout().await;
    result
}

async fn follow(session: &Session, keys: &[ResourceKey], global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let (tx, mut rx) = mpsc::unbounded_channel::<ResourceUpdate>();

    let mut subscriptions = Vec::with_capacity(keys.len());
    let mut schedules = Vec::with_capacity(keys.len());
    for &key in keys {
        if let Some(current) = session.store().get_any(key) {
            let _ = tx.send(current);
        }
        let tx = tx.clone();
        subscriptions.push(session.store().subscribe_any(key, move |update| {
            let _ = tx.send(update.clone());
        }));
        schedules.push(session.poller().subscribe(key));
    }
    drop(tx);

    let mut state = session.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("interrupted");
                break;
            }
            Some(update) = rx.recv() => {
                let rates = (update.resource == ResourceKey::Service)
                    .then(|| session.traffic_rates())
                    .flatten();
                let line = render_update(&update, rates, global.output, color)?;
                output::print_output(&line, global.quiet);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == SessionState::Unauthenticated {
                    return Err(CliError::AuthFailed {
                        message: "the daemon rejected the session token".into(),
                    });
                }
            }
        }
    }

    drop(schedules);
    drop(subscriptions);
    Ok(())
}
