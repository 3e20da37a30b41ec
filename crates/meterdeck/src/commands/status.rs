//! Status command handler.

use chrono::{DateTime, Utc};
use serde::Serialize;

use meterdeck_core::{Controller, MqttProbe};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct StatusReport {
    backend: String,
    database_connected: bool,
    mqtt_connected: bool,
    meters: usize,
    named: usize,
    online: usize,
    offline: usize,
    last_refresh: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mqtt_probe: Option<MqttProbe>,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "connected" } else { "disconnected" }
}

fn detail(r: &StatusReport) -> String {
    let mut lines = vec![
        format!("Backend:   {}", r.backend),
        format!("Database:  {}", yes_no(r.database_connected)),
        format!("MQTT:      {}", yes_no(r.mqtt_connected)),
        format!(
            "Meters:    {} ({} named, {} online, {} offline)",
            r.meters, r.named, r.online, r.offline
        ),
        format!("Refreshed: {}", output::timestamp(r.last_refresh)),
    ];
    if let Some(ref probe) = r.mqtt_probe {
        lines.push(String::new());
        lines.push(format!("MQTT probe: {}", probe.status));
        if let Some(ref broker) = probe.broker {
            lines.push(format!("  Broker:     {broker}"));
        }
        if let Some(ref topic) = probe.test_topic {
            lines.push(format!("  Test topic: {topic}"));
        }
        if let Some(ref message) = probe.message {
            lines.push(format!("  Message:    {message}"));
        }
    }
    lines.join("\n")
}

pub async fn handle(
    controller: &Controller,
    args: StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let Some(system) = controller.fetch_system_status().await else {
        return util::ensure_ok(controller);
    };

    let mqtt_probe = if args.mqtt {
        Some(controller.test_mqtt_connection().await)
    } else {
        None
    };

    let store = controller.store();
    let report = StatusReport {
        backend: controller.config().url.to_string(),
        database_connected: system.database_connected,
        mqtt_connected: system.mqtt_connected,
        meters: store.meter_count(),
        named: store.meters_snapshot().iter().filter(|m| m.is_named()).count(),
        online: controller.active_meters().len(),
        offline: controller.inactive_meters().len(),
        last_refresh: store.last_full_refresh(),
        mqtt_probe,
    };

    let out = output::render_single(&global.output, &report, detail, |r| {
        format!(
            "database={} mqtt={}",
            r.database_connected, r.mqtt_connected
        )
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
