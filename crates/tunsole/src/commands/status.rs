//! Status summary: device, engine and proxy in one view.

use serde::Serialize;
use tunsole_core::{DeviceStatus, ProxyConfig, ServiceStatus, TrafficRates};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    endpoint: String,
    device: Option<DeviceStatus>,
    service: Option<ServiceStatus>,
    proxy: Option<ProxyConfig>,
    /// Derived from counters when two observations exist, otherwise the
    /// daemon's own speed readings.
    rates: Option<TrafficRates>,
}

impl StatusReport {
    fn rates_or_reported(&self) -> Option<TrafficRates> {
        self.rates.or_else(|| {
            let traffic = self.service.as_ref()?.traffic?;
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let reported = TrafficRates {
                upload_bps: traffic.upload_speed as f64,
                download_bps: traffic.download_speed as f64,
            };
            Some(reported)
        })
    }
}

fn detail(report: &StatusReport, color: bool) -> String {
    let mut lines = vec![format!("Endpoint:    {}", report.endpoint)];

    match report.device {
        Some(ref d) if d.exists => {
            let state = output::paint_state(&d.status.to_string(), d.is_up(), color);
            lines.push(format!("Device:      {} ({state})", d.name));
            lines.push(format!(
                "Address:     {}",
                d.ip_address.map_or_else(|| "-".into(), |ip| ip.to_string())
            ));
            if let Some(mtu) = d.mtu {
                lines.push(format!("MTU:         {mtu}"));
            }
        }
        Some(ref d) => {
            let state = output::paint_state("absent", false, color);
            lines.push(format!("Device:      {} ({state})", d.name));
        }
        None => lines.push("Device:      -".into()),
    }

    match report.service {
        Some(ref s) if s.running => {
            lines.push(format!(
                "Engine:      {}",
                output::paint_state("running", true, color)
            ));
            if let Some(pid) = s.pid {
                lines.push(format!("PID:         {pid}"));
            }
            if let Some(up) = s.uptime {
                lines.push(format!("Uptime:      {}", output::format_uptime(up)));
            }
            if let Some(conns) = s.connections {
                lines.push(format!("Connections: {conns}"));
            }
            if let Some(traffic) = s.traffic {
                let rates = report.rates_or_reported().unwrap_or_default();
                lines.push(format!(
                    "Upload:      {} ({})",
                    output::format_bytes(traffic.upload_bytes),
                    output::format_rate(rates.upload_bps)
                ));
                lines.push(format!(
                    "Download:    {} ({})",
                    output::format_bytes(traffic.download_bytes),
                    output::format_rate(rates.download_bps)
                ));
            }
            if let Some(mem) = s.memory_usage {
                lines.push(format!("Memory:      {}", output::format_bytes(mem)));
            }
            if let Some(cpu) = s.cpu_usage {
                lines.push(format!("CPU:         {cpu:.1}%"));
            }
        }
        Some(_) => lines.push(format!(
            "Engine:      {}",
            output::paint_state("stopped", false, color)
        )),
        None => lines.push("Engine:      -".into()),
    }

    let proxy = report
        .proxy
        .as_ref()
        .map_or_else(|| "-".into(), ProxyConfig::url);
    lines.push(format!("Proxy:       {proxy}"));

    lines.join("\n")
}

fn plain(report: &StatusReport) -> String {
    let running = report.service.as_ref().is_some_and(|s| s.running);
    if running { "running" } else { "stopped" }.to_owned()
}

pub async fn handle(target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    let endpoint = target.session.endpoint.to_string();
    let report = util::oneshot(target, |session| async move {
        let store = session.store();
        Ok(StatusReport {
            endpoint,
            device: store.device().map(|s| (*s.value).clone()),
            service: store.service().map(|s| (*s.value).clone()),
            proxy: store.proxy().map(|s| (*s.value).clone()),
            rates: session.traffic_rates(),
        })
    })
    .await?;

    let color = output::should_color(global.color);
    let out = output::render_single(global.output, &report, |r| detail(r, color), plain)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
