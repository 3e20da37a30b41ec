// ── API-to-domain type conversions ──
//
// Bridges raw `meterdeck_api` wire types into `meterdeck_core::model`.
// Timestamps arrive in three shapes depending on which code path produced
// them, names may carry the backend's "unnamed" placeholder, and numbers
// may be strings. All of that is resolved here so the store only ever
// sees clean domain values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use meterdeck_api::models::{
    HealthResponse, RawDailyReading, RawMeter, RawMeterDetails, RawReading, UNNAMED_SENTINEL,
    value_as_f64,
};

use crate::model::{
    DailyReading, MacAddress, Meter, MeterStatus, MeterUpdate, PowerState, Reading, SystemStatus,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse any timestamp shape the backend emits.
///
/// Accepts RFC 3339, RFC 2822 (Flask's default `datetime` encoding),
/// `YYYY-MM-DD HH:MM:SS` and naive ISO `YYYY-MM-DDTHH:MM:SS[.f]`. Naive
/// values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_opt_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_timestamp)
}

/// Parse a calendar date, tolerating a trailing time component.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

/// Drop blank names and the backend's placeholder for "not named yet".
pub fn clean_name(raw: Option<&str>) -> Option<String> {
    let name = raw?.trim();
    if name.is_empty() || name == UNNAMED_SENTINEL {
        None
    } else {
        Some(name.to_owned())
    }
}

fn map_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| map.get(*k).and_then(Value::as_str))
}

fn map_u32(map: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn map_f64(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| map.get(*k).and_then(value_as_f64))
}

// ── Meter ──────────────────────────────────────────────────────────

impl From<RawMeter> for Meter {
    fn from(raw: RawMeter) -> Self {
        Meter {
            mac: MacAddress::new(&raw.mac),
            name: clean_name(raw.name.as_deref()),
            number: raw.number.as_ref().and_then(|n| n.as_u32()),
            status: raw
                .status
                .as_deref()
                .map_or(MeterStatus::Unknown, MeterStatus::from_wire),
            power: raw.power.as_deref().and_then(PowerState::from_wire),
            power_changed_at: parse_opt_timestamp(raw.power_changed_at.as_deref()),
            last_seen: parse_opt_timestamp(raw.last_seen.as_deref()),
            last_reading: raw.last_reading,
            last_reading_at: parse_opt_timestamp(raw.last_reading_time.as_deref()),
            days_with_data: raw.days_with_data,
            error: raw.error.filter(|e| !e.trim().is_empty()),
        }
    }
}

/// Build a meter from the per-meter details endpoint.
///
/// The details payload has no connectivity field, so `status` and
/// `last_seen` are carried over from `known` when the store already has
/// the meter.
pub fn meter_from_details(raw: &RawMeterDetails, known: Option<&Meter>) -> Meter {
    let mut meter = known
        .cloned()
        .unwrap_or_else(|| Meter::new(MacAddress::new(&raw.mac)));

    if let Some(info) = &raw.info {
        if let Some(name) = clean_name(map_str(info, &["name", "navn"])) {
            meter.name = Some(name);
        }
        if let Some(number) = map_u32(info, &["nummer", "number"]) {
            meter.number = Some(number);
        }
    }

    if let Some(reading) = &raw.last_reading {
        if let Some(value) = map_f64(reading, &["totalKwh", "value"]) {
            meter.last_reading = Some(value);
            meter.last_reading_at = parse_opt_timestamp(map_str(reading, &["tidspunkt", "timestamp"]));
        }
    }

    if let Some(status) = &raw.status {
        if let Some(state) = map_str(status, &["status"]).and_then(PowerState::from_wire) {
            meter.power = Some(state);
            meter.power_changed_at = parse_opt_timestamp(map_str(status, &["tidspunkt", "timestamp"]));
        }
    }

    meter
}

/// Turn a scan row into the only update allowed to create meters.
pub fn discovery_update(raw: &RawMeter) -> MeterUpdate {
    MeterUpdate::Discovered {
        status: raw
            .status
            .as_deref()
            .map_or(MeterStatus::Unknown, MeterStatus::from_wire),
        last_seen: parse_opt_timestamp(raw.last_seen.as_deref()),
        last_reading: raw.last_reading,
        days_with_data: raw.days_with_data,
    }
}

// ── Readings ───────────────────────────────────────────────────────

/// Readings rows without a timestamp or a numeric value are skipped.
pub fn reading_from_raw(raw: &RawReading) -> Option<Reading> {
    Some(Reading {
        timestamp: parse_opt_timestamp(raw.timestamp.as_deref())?,
        value: raw.total_kwh?,
    })
}

/// Daily rows without a parseable date are skipped.
pub fn daily_from_raw(raw: RawDailyReading) -> Option<DailyReading> {
    let date = raw.date.as_deref().and_then(parse_date)?;
    let mut columns = raw.columns;
    let total_kwh = ["totalKwh", "total_kwh", "forbrug"]
        .iter()
        .find_map(|k| columns.get(*k).and_then(value_as_f64));
    columns.remove("mac");
    Some(DailyReading {
        date,
        total_kwh,
        columns,
    })
}

// ── System ─────────────────────────────────────────────────────────

/// Backend health plus our own view of the push channel.
pub fn system_status(raw: &HealthResponse, push_connected: bool) -> SystemStatus {
    SystemStatus {
        database_connected: raw.db_connected,
        mqtt_connected: raw.mqtt_connected,
        push_connected,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use serde_json::json;

    fn raw_meter(value: Value) -> RawMeter {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_every_timestamp_shape() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T13:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("Sat, 01 Mar 2025 12:30:00 GMT"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn sentinel_and_blank_names_become_none() {
        assert_eq!(clean_name(Some("Unavngivet")), None);
        assert_eq!(clean_name(Some("  ")), None);
        assert_eq!(clean_name(None), None);
        assert_eq!(clean_name(Some(" Kontor ")).as_deref(), Some("Kontor"));
    }

    #[test]
    fn converts_list_row() {
        let meter = Meter::from(raw_meter(json!({
            "mac": "AA:BB:CC:00:11:22",
            "status": "online",
            "error": null,
            "lastSeen": "2025-03-01 12:30:00",
            "lastReading": 1234.5,
            "power": "tændt",
            "sidste_status_tid": "2025-03-01 12:00:00",
            "name": "Unavngivet",
            "number": 7
        })));

        assert_eq!(meter.mac.as_str(), "aa:bb:cc:00:11:22");
        assert!(meter.name.is_none());
        assert_eq!(meter.number, Some(7));
        assert_eq!(meter.status, MeterStatus::Online);
        assert_eq!(meter.power, Some(PowerState::On));
        assert_eq!(meter.last_seen.unwrap().hour(), 12);
        assert_eq!(meter.last_reading, Some(1234.5));
    }

    #[test]
    fn converts_offline_row_without_data() {
        let meter = Meter::from(raw_meter(json!({
            "mac": "aa:bb:cc:00:11:33",
            "status": "offline",
            "error": "Ingen data"
        })));
        assert_eq!(meter.status, MeterStatus::Offline);
        assert_eq!(meter.error.as_deref(), Some("Ingen data"));
        assert!(meter.last_reading.is_none());
    }

    #[test]
    fn details_keep_known_connectivity() {
        let raw: RawMeterDetails = serde_json::from_value(json!({
            "mac": "aa:bb:cc:00:11:22",
            "info": { "mac": "aa:bb:cc:00:11:22", "name": "Kontor", "nummer": "003" },
            "last_reading": { "totalKwh": 99.5, "tidspunkt": "2025-03-01T12:30:00" },
            "status": { "status": "Slukket", "tidspunkt": "2025-03-01T12:31:00" }
        }))
        .unwrap();

        let mut known = Meter::new(MacAddress::new("aa:bb:cc:00:11:22"));
        known.status = MeterStatus::Online;

        let meter = meter_from_details(&raw, Some(&known));
        assert_eq!(meter.status, MeterStatus::Online);
        assert_eq!(meter.name.as_deref(), Some("Kontor"));
        assert_eq!(meter.number, Some(3));
        assert_eq!(meter.last_reading, Some(99.5));
        assert_eq!(meter.power, Some(PowerState::Off));
        assert_eq!(meter.power_changed_at.unwrap().minute(), 31);
    }

    #[test]
    fn details_with_empty_sections() {
        let raw: RawMeterDetails = serde_json::from_value(json!({
            "mac": "aa:bb:cc:00:11:44",
            "info": {},
            "last_reading": {},
            "status": {}
        }))
        .unwrap();
        let meter = meter_from_details(&raw, None);
        assert_eq!(meter, Meter::new(MacAddress::new("aa:bb:cc:00:11:44")));
    }

    #[test]
    fn readings_without_value_are_skipped() {
        let good: RawReading =
            serde_json::from_value(json!({ "tidspunkt": "2025-03-01T12:30:00", "totalKwh": 1.5 }))
                .unwrap();
        let bad: RawReading =
            serde_json::from_value(json!({ "tidspunkt": "2025-03-01T12:30:00" })).unwrap();
        assert_eq!(reading_from_raw(&good).unwrap().value, 1.5);
        assert!(reading_from_raw(&bad).is_none());
    }

    #[test]
    fn daily_rows_keep_extra_columns() {
        let raw: RawDailyReading = serde_json::from_value(json!({
            "mac": "aa:bb",
            "dato": "2025-03-01",
            "totalKwh": 4.25,
            "min_kwh": 100.0
        }))
        .unwrap();
        let daily = daily_from_raw(raw).unwrap();
        assert_eq!(daily.date.day(), 1);
        assert_eq!(daily.total_kwh, Some(4.25));
        assert!(daily.columns.contains_key("min_kwh"));
        assert!(!daily.columns.contains_key("mac"));
    }

    #[test]
    fn scan_rows_become_discovery_updates() {
        let update = discovery_update(&raw_meter(json!({
            "mac": "aa:bb:cc:00:11:99",
            "sidst_set": "2025-03-01T12:00:00",
            "status": "online",
            "seneste_totalKwh": 12.5,
            "antal_dage_med_data": 2
        })));
        assert!(update.creates_entry());
        let MeterUpdate::Discovered {
            status,
            last_reading,
            days_with_data,
            ..
        } = update
        else {
            panic!("expected discovery");
        };
        assert_eq!(status, MeterStatus::Online);
        assert_eq!(last_reading, Some(12.5));
        assert_eq!(days_with_data, Some(2));
    }
}
