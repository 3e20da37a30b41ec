//! Scan command handler.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use meterdeck_core::{Controller, MacAddress};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last reading")]
    reading: String,
    #[tabled(rename = "Days with data")]
    days: String,
}

fn spinner(global: &GlobalOpts) -> ProgressBar {
    if global.quiet || !matches!(global.output, OutputFormat::Table) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message("Scanning for meters...");
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub async fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let bar = spinner(global);
    let result = controller.scan_for_meters().await;
    bar.finish_and_clear();

    let Some(result) = result else {
        return util::ensure_ok(controller);
    };

    if !matches!(global.output, OutputFormat::Table) {
        let out = output::render_single(&global.output, &result, |_| String::new(), |r| {
            r.discovered
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        });
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    if !global.quiet {
        let summary = result
            .message
            .clone()
            .unwrap_or_else(|| format!("Found {} unnamed meter(s)", result.count));
        eprintln!("{summary} ({} new)", result.created);
    }
    if result.discovered.is_empty() {
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let store = controller.store();
    let out = output::render_list(
        &global.output,
        &result.discovered,
        |mac: &MacAddress| {
            let meter = store.meter(mac);
            DiscoveredRow {
                mac: mac.to_string(),
                status: meter
                    .as_ref()
                    .map_or_else(|| "-".into(), |m| output::status_label(m.status, color)),
                reading: output::kwh(meter.as_ref().and_then(|m| m.last_reading)),
                days: meter
                    .as_ref()
                    .and_then(|m| m.days_with_data)
                    .map_or_else(|| "-".into(), |d| d.to_string()),
            }
        },
        ToString::to_string,
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
