//! Route command handlers.

use serde::Serialize;
use tabled::Tabled;
use tunsole_core::{
    Route, RouteDraft, RouteEntry, RouteRequest, normalize_cidr, normalize_gateway,
};

use crate::cli::{GlobalOpts, RoutesArgs, RoutesCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "CIDR")]
    cidr: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Metric")]
    metric: u32,
}

impl From<&Route> for RouteRow {
    fn from(r: &Route) -> Self {
        Self {
            cidr: r.cidr.clone(),
            gateway: if r.gateway.is_empty() {
                "on-link".into()
            } else {
                r.gateway.clone()
            },
            device: r.device.clone(),
            metric: r.metric,
        }
    }
}

fn route_detail(r: &Route) -> String {
    [
        format!("CIDR:    {}", r.cidr),
        format!(
            "Gateway: {}",
            if r.gateway.is_empty() { "on-link" } else { &r.gateway }
        ),
        format!("Device:  {}", r.device),
        format!("Metric:  {}", r.metric),
    ]
    .join("\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRun<'a> {
    dry_run: bool,
    route: &'a RouteDraft,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: RoutesArgs, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        RoutesCommand::List => {
            let routes: Vec<Route> = util::oneshot(target, |session| async move {
                Ok(session
                    .store()
                    .routes()
                    .map(|t| t.value.routes().cloned().collect())
                    .unwrap_or_default())
            })
            .await?;

            let out = output::render_list(
                global.output,
                &routes,
                |r| RouteRow::from(r),
                |r| r.cidr.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RoutesCommand::Add {
            cidr,
            gateway,
            metric,
            dry_run,
        } => {
            // Reject bad input before touching the network.
            let normalized = normalize_cidr(&cidr)?;
            if let Some(ref gw) = gateway {
                normalize_gateway(gw)?;
            }

            let request = RouteRequest {
                cidr: normalized.to_string(),
                gateway,
                metric,
            };
            let quiet = global.quiet;

            let (draft, route) = util::oneshot(target, |session| async move {
                let mut draft = session.mutations().compose_route(&request.cidr, request.metric)?;
                if let Some(ref gw) = request.gateway {
                    draft.gateway = normalize_gateway(gw)?;
                }
                if dry_run {
                    return Ok((draft, None));
                }
                output::notice(
                    &format!(
                        "Adding route {} via {} (metric {})",
                        draft.cidr, draft.gateway, draft.metric
                    ),
                    quiet,
                );
                let route = session.mutations().add_route(request).await?;
                Ok((draft, Some(route)))
            })
            .await?;

            let out = match route {
                Some(route) => output::render_single(
                    global.output,
                    &route,
                    route_detail,
                    |r| r.cidr.clone(),
                )?,
                None => output::render_single(
                    global.output,
                    &DryRun {
                        dry_run: true,
                        route: &draft,
                    },
                    |d| {
                        format!(
                            "Would add route {} via {} (metric {})",
                            d.route.cidr, d.route.gateway, d.route.metric
                        )
                    },
                    |d| d.route.cidr.to_string(),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RoutesCommand::Delete { cidr } => {
            let normalized = normalize_cidr(&cidr)?.to_string();

            if !util::confirm(
                &format!("Delete route {normalized}?"),
                global.yes,
                "routes delete",
            )? {
                return Ok(());
            }

            let key = normalized.clone();
            let removed: Option<RouteEntry> = util::oneshot(target, |session| async move {
                let existing = session
                    .store()
                    .routes()
                    .and_then(|t| t.value.get(&key).cloned());
                if existing.is_some() {
                    session.mutations().delete_route(&key).await?;
                }
                Ok(existing)
            })
            .await?;

            let Some(entry) = removed else {
                return Err(CliError::NotFound {
                    resource_type: "route".into(),
                    identifier: normalized,
                    list_command: "routes list".into(),
                });
            };

            output::notice(
                &format!("Deleted route {} via {}", entry.route.cidr, entry.route.device),
                global.quiet,
            );
            Ok(())
        }
    }
}
