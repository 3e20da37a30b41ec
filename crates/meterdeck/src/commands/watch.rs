//! Watch command handler: follows the store while the push channel merges
//! live updates into it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use meterdeck_core::{Controller, MacAddress, Meter};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Change {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Serialize)]
struct WatchEvent {
    at: DateTime<Utc>,
    change: Change,
    mac: MacAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    meter: Option<Arc<Meter>>,
}

fn index(meters: &[Arc<Meter>]) -> HashMap<MacAddress, Arc<Meter>> {
    meters.iter().map(|m| (m.mac.clone(), Arc::clone(m))).collect()
}

/// Every meter that appeared, changed or vanished between two snapshots.
fn diff(
    previous: &HashMap<MacAddress, Arc<Meter>>,
    current: &[Arc<Meter>],
    at: DateTime<Utc>,
) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    for meter in current {
        let change = match previous.get(&meter.mac) {
            None => Change::Added,
            Some(old) if old.as_ref() != meter.as_ref() => Change::Updated,
            Some(_) => continue,
        };
        events.push(WatchEvent {
            at,
            change,
            mac: meter.mac.clone(),
            meter: Some(Arc::clone(meter)),
        });
    }

    let still_there: std::collections::HashSet<&MacAddress> =
        current.iter().map(|m| &m.mac).collect();
    let mut removed: Vec<&MacAddress> = previous
        .keys()
        .filter(|mac| !still_there.contains(mac))
        .collect();
    removed.sort();
    events.extend(removed.into_iter().map(|mac| WatchEvent {
        at,
        change: Change::Removed,
        mac: mac.clone(),
        meter: None,
    }));
    events
}

fn render_event(event: &WatchEvent, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event).trim_end()),
        OutputFormat::Plain => format!("{:?}\t{}", event.change, event.mac).to_lowercase(),
        OutputFormat::Table => {
            let time = output::timestamp(Some(event.at));
            match event.meter {
                Some(ref m) => format!(
                    "{time}  {:<7}  {}  {:<20}  {:<8}  {:<4}  {}",
                    format!("{:?}", event.change).to_lowercase(),
                    m.mac,
                    m.display_name(),
                    output::status_label(m.status, color),
                    output::power_label(m.power, color),
                    output::kwh(m.last_reading),
                ),
                None => format!("{time}  removed  {}", event.mac),
            }
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::ensure_ok(controller)?;

    let color = output::should_color(&global.color);
    let store = controller.store();
    let mut meters = store.subscribe_meters();
    let mut system = store.subscribe_system();
    let mut previous = index(meters.current());
    let mut push_connected = system.current().push_connected;

    let stop_after = args.duration.map(Duration::from_secs);
    let deadline = async move {
        match stop_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    if !global.quiet {
        eprintln!(
            "Watching {} meter(s) at {}. Press Ctrl-C to stop.",
            previous.len(),
            controller.config().url
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            Some(snapshot) = meters.changed() => {
                for event in diff(&previous, &snapshot, Utc::now()) {
                    output::print_output(&render_event(&event, &global.output, color), global.quiet);
                }
                previous = index(&snapshot);
            }
            Some(status) = system.changed() => {
                if status.push_connected != push_connected {
                    push_connected = status.push_connected;
                    tracing::info!(connected = push_connected, "push channel state changed");
                    if !global.quiet {
                        let state = if push_connected { "connected" } else { "disconnected" };
                        eprintln!("Push channel {state}");
                    }
                }
            }
            else => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterdeck_core::MeterStatus;

    fn meter(mac: &str, status: MeterStatus) -> Arc<Meter> {
        let mut m = Meter::new(MacAddress::new(mac));
        m.name = Some("Kontor".into());
        m.status = status;
        Arc::new(m)
    }

    #[test]
    fn diff_reports_each_kind_of_change() {
        let before = index(&[
            meter("aa:01", MeterStatus::Online),
            meter("aa:02", MeterStatus::Online),
        ]);
        let after = vec![
            meter("aa:01", MeterStatus::Online),
            meter("aa:02", MeterStatus::Offline),
            meter("aa:03", MeterStatus::Unknown),
        ];
        let events = diff(&before, &after, Utc::now());
        let kinds: Vec<_> = events.iter().map(|e| (e.mac.as_str(), e.change)).collect();
        assert_eq!(
            kinds,
            vec![("aa:02", Change::Updated), ("aa:03", Change::Added)]
        );

        let events = diff(&index(&after), &after[..1], Utc::now());
        let kinds: Vec<_> = events.iter().map(|e| (e.mac.as_str(), e.change)).collect();
        assert_eq!(
            kinds,
            vec![("aa:02", Change::Removed), ("aa:03", Change::Removed)]
        );
    }

    #[test]
    fn plain_lines_are_tab_separated() {
        let event = WatchEvent {
            at: Utc::now(),
            change: Change::Removed,
            mac: MacAddress::new("AA:01"),
            meter: None,
        };
        assert_eq!(
            render_event(&event, &OutputFormat::Plain, false),
            "removed\taa:01"
        );
    }
}
