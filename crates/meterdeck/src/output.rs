//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use meterdeck_core::{MeterStatus, PowerState};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Connectivity label: green online, red offline, dim unknown.
pub fn status_label(status: MeterStatus, color: bool) -> String {
    let label = status.to_string();
    if !color {
        return label;
    }
    match status {
        MeterStatus::Online => label.green().to_string(),
        MeterStatus::Offline => label.red().to_string(),
        MeterStatus::Unknown => label.dimmed().to_string(),
    }
}

/// Relay label, `-` when the state has never been reported.
pub fn power_label(power: Option<PowerState>, color: bool) -> String {
    match (power, color) {
        (None, _) => "-".into(),
        (Some(state), false) => state.to_string(),
        (Some(PowerState::On), true) => "on".bold().to_string(),
        (Some(PowerState::Off), true) => "off".dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item detail views don't use `Tabled`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty-printed JSON.
pub(crate) fn render_json_pretty<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| serialization_failed(&e))
}

/// Compact single-line JSON.
pub(crate) fn render_json_compact<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| serialization_failed(&e))
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    if compact {
        render_json_compact(data)
    } else {
        render_json_pretty(data)
    }
}

/// YAML output.
pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| serialization_failed(&e))
}

fn serialization_failed(err: &dyn std::fmt::Display) -> String {
    tracing::error!(error = %err, "output serialization failed");
    String::new()
}

// ── Value formatting ─────────────────────────────────────────────────

/// Local time for a UTC timestamp, `-` when absent.
pub fn timestamp(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(
        || "-".into(),
        |t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Energy in kWh with three decimals, `-` when absent.
pub fn kwh(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.3} kWh"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, Tabled)]
    struct Row {
        mac: String,
    }

    #[test]
    fn plain_prints_one_id_per_line() {
        let rows = vec![Row { mac: "aa:01".into() }, Row { mac: "aa:02".into() }];
        let out = render_list(&OutputFormat::Plain, &rows, |r| Row { mac: r.mac.clone() }, |r| {
            r.mac.clone()
        });
        assert_eq!(out, "aa:01\naa:02");
    }

    #[test]
    fn compact_json_is_one_line() {
        let rows = vec![Row { mac: "aa:01".into() }];
        let out = render_list(
            &OutputFormat::JsonCompact,
            &rows,
            |r| Row { mac: r.mac.clone() },
            |r| r.mac.clone(),
        );
        assert_eq!(out, r#"[{"mac":"aa:01"}]"#);
    }

    #[test]
    fn labels_without_color_are_plain() {
        assert_eq!(status_label(MeterStatus::Offline, false), "offline");
        assert_eq!(power_label(Some(PowerState::On), false), "on");
        assert_eq!(power_label(None, true), "-");
        assert_eq!(kwh(Some(12.5)), "12.500 kWh");
    }
}
