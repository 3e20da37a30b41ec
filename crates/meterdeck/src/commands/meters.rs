//! Meter command handlers.

use std::sync::Arc;

use tabled::Tabled;

use meterdeck_core::{Controller, DailyReading, MacAddress, Meter, Reading};

use crate::cli::{GlobalOpts, ListArgs, MetersArgs, MetersCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct MeterRow {
    #[tabled(rename = "No.")]
    number: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Last reading")]
    reading: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

impl MeterRow {
    fn new(m: &Meter, color: bool) -> Self {
        Self {
            number: meter_number(m),
            name: m.name.clone().unwrap_or_default(),
            mac: m.mac.to_string(),
            status: output::status_label(m.status, color),
            power: output::power_label(m.power, color),
            reading: output::kwh(m.last_reading),
            last_seen: output::timestamp(m.last_seen),
        }
    }
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Total")]
    value: String,
}

impl From<&Reading> for ReadingRow {
    fn from(r: &Reading) -> Self {
        Self {
            time: output::timestamp(Some(r.timestamp)),
            value: output::kwh(Some(r.value)),
        }
    }
}

#[derive(Tabled)]
struct DailyRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Total")]
    total: String,
}

impl From<&DailyReading> for DailyRow {
    fn from(d: &DailyReading) -> Self {
        Self {
            date: d.date.to_string(),
            total: output::kwh(d.total_kwh),
        }
    }
}

fn meter_number(m: &Meter) -> String {
    m.number.map_or_else(|| "-".into(), |n| format!("{n:03}"))
}

fn detail(m: &Meter, color: bool) -> String {
    let mut lines = vec![
        format!("MAC:          {}", m.mac),
        format!("Name:         {}", m.name.as_deref().unwrap_or("-")),
        format!("Number:       {}", meter_number(m)),
        format!("Status:       {}", output::status_label(m.status, color)),
        format!("Power:        {}", output::power_label(m.power, color)),
        format!("Last seen:    {}", output::timestamp(m.last_seen)),
        format!("Last reading: {}", output::kwh(m.last_reading)),
        format!("Reading at:   {}", output::timestamp(m.last_reading_at)),
    ];
    if m.power_changed_at.is_some() {
        lines.push(format!(
            "Switched at:  {}",
            output::timestamp(m.power_changed_at)
        ));
    }
    if let Some(ref err) = m.error {
        lines.push(format!("Error:        {err}"));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(
    controller: &Controller,
    args: MetersArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        MetersCommand::List(list) => {
            // `connect()` already loaded the list; surface its failure.
            util::ensure_ok(controller)?;
            list_meters(controller, &list, global, color);
            Ok(())
        }

        MetersCommand::Get { mac } => {
            let Some(meter) = controller.fetch_meter(&mac).await else {
                return util::ensure_ok(controller);
            };
            let out = output::render_single(
                &global.output,
                &meter,
                |m| detail(m, color),
                |m| m.mac.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MetersCommand::Readings { mac, limit } => {
            controller.store().clear_error();
            let readings = controller.fetch_readings(&mac, limit).await;
            util::ensure_ok(controller)?;
            let out = output::render_list(&global.output, &readings, |r| ReadingRow::from(r), |r| {
                format!("{}\t{}", r.timestamp.to_rfc3339(), r.value)
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MetersCommand::Daily { mac, days } => {
            controller.store().clear_error();
            let daily = controller.fetch_daily_readings(&mac, days).await;
            util::ensure_ok(controller)?;
            let out = output::render_list(&global.output, &daily, |d| DailyRow::from(d), |d| {
                format!(
                    "{}\t{}",
                    d.date,
                    d.total_kwh.map_or_else(String::new, |v| v.to_string())
                )
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MetersCommand::Name { mac, name, number } => {
            util::check_name(&name)?;
            util::check_number(number)?;
            if !controller.update_meter_name(&mac, &name, number).await {
                return util::ensure_ok(controller);
            }
            if !global.quiet {
                eprintln!("Meter {mac} is now {number:03} {}", name.trim());
            }
            Ok(())
        }

        MetersCommand::Rename { mac, name, number } => {
            util::check_name(&name)?;
            util::check_number(number)?;
            if !controller.rename_meter_legacy(&mac, &name, number).await {
                return util::ensure_ok(controller);
            }
            if !global.quiet {
                eprintln!("Meter {mac} renamed");
            }
            Ok(())
        }

        MetersCommand::Delete { mac, code } => {
            let label = controller
                .store()
                .meter(&MacAddress::new(&mac))
                .map_or_else(|| mac.clone(), |m| m.display_name().to_owned());
            if !util::confirm(
                "meters delete",
                &format!("Delete meter {label} and all of its readings?"),
                global.yes,
            )? {
                return Ok(());
            }
            if !controller.delete_meter(&mac, &code).await {
                return util::ensure_ok(controller);
            }
            if !global.quiet {
                eprintln!("Meter {label} deleted");
            }
            Ok(())
        }

        MetersCommand::On { mac } => {
            if !controller.turn_on(&mac).await {
                return util::ensure_ok(controller);
            }
            if !global.quiet {
                eprintln!("Power on sent to {mac}");
            }
            Ok(())
        }

        MetersCommand::Off { mac } => {
            if !controller.turn_off(&mac).await {
                return util::ensure_ok(controller);
            }
            if !global.quiet {
                eprintln!("Power off sent to {mac}");
            }
            Ok(())
        }
    }
}

fn list_meters(controller: &Controller, list: &ListArgs, global: &GlobalOpts, color: bool) {
    let store = controller.store();
    if let Some(ref search) = list.search {
        store.set_search(search.as_str());
    }
    store.set_active_only(list.active);
    if let Some(page_size) = list.page_size {
        store.set_page_size(page_size);
    }
    store.set_page(list.page);

    let (meters, footer): (Vec<Arc<Meter>>, Option<String>) = if list.all {
        (controller.filtered_meters(), None)
    } else {
        let view = controller.view();
        let footer = format!(
            "page {}/{} ({} of {} meters)",
            view.page,
            view.total_pages.max(1),
            view.filtered_count,
            view.total_count
        );
        (view.items, Some(footer))
    };

    let out = output::render_list(
        &global.output,
        &meters,
        |m| MeterRow::new(m, color),
        |m| m.mac.to_string(),
    );
    output::print_output(&out, global.quiet);

    let show_footer = !global.quiet && matches!(global.output, OutputFormat::Table);
    if let Some(footer) = footer.filter(|_| show_footer) {
        eprintln!("{footer}");
    }
}
