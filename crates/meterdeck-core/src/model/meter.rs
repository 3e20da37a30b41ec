// ── Meter domain types ──

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::MacAddress;

/// Connectivity of a meter as last reported by the backend or MQTT.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MeterStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl MeterStatus {
    /// Lenient parse: anything unrecognized is `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

/// Relay state of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Accepts the backend's Danish labels (`"Tændt"`, `"slukket"`) as
    /// well as `on`/`off`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "tændt" | "taendt" | "on" | "1" | "true" => Some(Self::On),
            "slukket" | "off" | "0" | "false" => Some(Self::Off),
            _ => None,
        }
    }
}

/// A metered power outlet known to the backend.
///
/// `name` and `number` are `None` until someone names the meter; the
/// backend's "unnamed" placeholder never makes it into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub mac: MacAddress,
    pub name: Option<String>,
    pub number: Option<u32>,
    pub status: MeterStatus,
    pub power: Option<PowerState>,
    pub power_changed_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Cumulative energy in kWh.
    pub last_reading: Option<f64>,
    pub last_reading_at: Option<DateTime<Utc>>,
    /// Days with measurements, reported by discovery scans only.
    pub days_with_data: Option<u32>,
    /// Backend-side error string for this meter, if any.
    pub error: Option<String>,
}

impl Meter {
    /// A meter with nothing known but its identity.
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            name: None,
            number: None,
            status: MeterStatus::Unknown,
            power: None,
            power_changed_at: None,
            last_seen: None,
            last_reading: None,
            last_reading_at: None,
            days_with_data: None,
            error: None,
        }
    }

    pub fn is_named(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    pub fn is_online(&self) -> bool {
        self.status == MeterStatus::Online
    }

    /// Name for display, falling back to the identity.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.mac.as_str())
    }
}

/// One cumulative energy measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// Cumulative energy in kWh.
    pub value: f64,
}

/// One day's aggregate. The backend's daily table has no fixed column
/// set beyond the date, so extra columns are carried through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReading {
    pub date: NaiveDate,
    pub total_kwh: Option<f64>,
    #[serde(flatten)]
    pub columns: serde_json::Map<String, serde_json::Value>,
}

/// Backend and transport health. Not about any individual meter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub database_connected: bool,
    pub mqtt_connected: bool,
    pub push_connected: bool,
}
