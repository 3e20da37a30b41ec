// Backend wire types
//
// Serde types mirroring the JSON the meter backend actually emits. The
// backend mixes English and Danish column names depending on which table a
// row came from, so most fields carry an alias. Timestamps stay as strings
// here; `meterdeck-core` parses them into domain types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Display name the backend uses for a meter nobody has named yet.
pub const UNNAMED_SENTINEL: &str = "Unavngivet";

// ── Loose scalars ────────────────────────────────────────────────────

/// A meter number as the backend sends it: an integer from the meter
/// list, a zero-padded string from the update endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Int(i64),
    Text(String),
}

impl LooseNumber {
    /// Numeric value, if the payload holds one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(n) => u32::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Accept a float, an integer, a numeric string, or null.
fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

/// Numeric view of a JSON value, tolerating numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Meters ───────────────────────────────────────────────────────────

/// One row of `GET /api/meters`, also reused for scan results.
///
/// The scan endpoint reports `sidst_set` / `seneste_totalKwh` instead of
/// `lastSeen` / `lastReading`; aliases fold both shapes into one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeter {
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<LooseNumber>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// `"tændt"` / `"slukket"` when a power status has been recorded.
    #[serde(default)]
    pub power: Option<String>,
    #[serde(default, rename = "lastSeen", alias = "sidst_set")]
    pub last_seen: Option<String>,
    #[serde(
        default,
        rename = "lastReading",
        alias = "seneste_totalKwh",
        deserialize_with = "loose_f64"
    )]
    pub last_reading: Option<f64>,
    #[serde(default, rename = "lastReadingTime")]
    pub last_reading_time: Option<String>,
    #[serde(default, rename = "sidste_status_tid")]
    pub power_changed_at: Option<String>,
    #[serde(default, rename = "antal_dage_med_data")]
    pub days_with_data: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `GET /api/meters/{mac}`: three loosely-shaped sections keyed by table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeterDetails {
    pub mac: String,
    /// Row from the meter info table (`name`, `nummer`, ...).
    #[serde(default)]
    pub info: Option<serde_json::Map<String, Value>>,
    /// Latest measurement row (`totalKwh`, `tidspunkt`, ...).
    #[serde(default)]
    pub last_reading: Option<serde_json::Map<String, Value>>,
    /// Latest power status row (`status`, `tidspunkt`).
    #[serde(default)]
    pub status: Option<serde_json::Map<String, Value>>,
}

/// One measurement row from `GET /api/meters/{mac}/readings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default, rename = "tidspunkt", alias = "timestamp")]
    pub timestamp: Option<String>,
    #[serde(
        default,
        rename = "totalKwh",
        alias = "value",
        deserialize_with = "loose_f64"
    )]
    pub total_kwh: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One row from `GET /api/meters/{mac}/daily`.
///
/// Only the date column is fixed; the aggregate columns are whatever the
/// daily table holds and are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDailyReading {
    #[serde(default, rename = "dato", alias = "date")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub columns: serde_json::Map<String, Value>,
}

// ── Request bodies ───────────────────────────────────────────────────

/// Body for `POST /api/meter/update`.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertMeterRequest<'a> {
    pub mac: &'a str,
    pub name: &'a str,
    /// Always three digits, zero padded.
    pub number: String,
}

/// Body for the legacy `POST /api/meters/{mac}/name`.
#[derive(Debug, Clone, Serialize)]
pub struct RenameMeterRequest<'a> {
    pub name: &'a str,
    pub number: String,
}

/// Body for `DELETE /api/meters/{mac}`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteMeterRequest<'a> {
    pub code: &'a str,
}

// ── Responses ────────────────────────────────────────────────────────

/// `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub db_connected: bool,
    #[serde(default)]
    pub mqtt_connected: bool,
}

/// Generic `{ status, message }` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The meter echoed back by `POST /api/meter/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertedMeter {
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<LooseNumber>,
}

/// `POST /api/meter/update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertMeterResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub meter: Option<UpsertedMeter>,
}

/// `POST /api/meters/{mac}/on` and `/off`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

/// `POST /api/scan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub meters: Vec<RawMeter>,
}

/// `GET /api/mqtt/test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttTestResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub test_topic: Option<String>,
}
