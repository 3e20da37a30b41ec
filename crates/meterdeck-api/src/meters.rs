// Meter endpoints
//
// Listing, details, readings, naming, deletion and power control for
// individual meters. Every identity goes into the URL as its own path
// segment so MAC colons never split the path.

use tracing::debug;

use crate::client::MeterClient;
use crate::error::Error;
use crate::models::{
    DeleteMeterRequest, PowerResponse, RawDailyReading, RawMeter, RawMeterDetails, RawReading,
    RenameMeterRequest, StatusResponse, UpsertMeterRequest, UpsertMeterResponse,
};

/// Largest readings window the backend serves.
pub const MAX_READINGS: u32 = 200;

/// Default and ceiling for the daily aggregate window.
pub const DEFAULT_DAILY_DAYS: u32 = 30;
pub const MAX_DAILY_DAYS: u32 = 365;

/// Power command sent to a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    On,
    Off,
}

impl PowerCommand {
    fn segment(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Render a meter number the way the backend stores it.
pub fn format_meter_number(number: u32) -> String {
    format!("{number:03}")
}

impl MeterClient {
    /// List every known meter.
    ///
    /// `GET /api/meters`
    pub async fn list_meters(&self) -> Result<Vec<RawMeter>, Error> {
        let url = self.api_url(&["meters"])?;
        debug!("listing meters");
        self.get(url).await
    }

    /// Fetch the detail sections for one meter.
    ///
    /// `GET /api/meters/{mac}`
    pub async fn get_meter(&self, mac: &str) -> Result<RawMeterDetails, Error> {
        let url = self.api_url(&["meters", mac])?;
        debug!(mac, "fetching meter details");
        self.get(url).await
    }

    /// Most recent measurements, newest first. `limit` is clamped to
    /// `1..=200`.
    ///
    /// `GET /api/meters/{mac}/readings?limit=N`
    pub async fn get_readings(&self, mac: &str, limit: u32) -> Result<Vec<RawReading>, Error> {
        let mut url = self.api_url(&["meters", mac, "readings"])?;
        let limit = limit.clamp(1, MAX_READINGS);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        debug!(mac, limit, "fetching readings");
        self.get(url).await
    }

    /// Daily aggregates ordered by date. `days` is clamped to `1..=365`.
    ///
    /// `GET /api/meters/{mac}/daily?days=N`
    pub async fn get_daily_readings(
        &self,
        mac: &str,
        days: u32,
    ) -> Result<Vec<RawDailyReading>, Error> {
        let mut url = self.api_url(&["meters", mac, "daily"])?;
        let days = days.clamp(1, MAX_DAILY_DAYS);
        url.query_pairs_mut().append_pair("days", &days.to_string());
        debug!(mac, days, "fetching daily readings");
        self.get(url).await
    }

    /// Create or update a meter's display name and number.
    ///
    /// The backend rejects numbers already held by another meter with
    /// `409`, surfaced as [`Error::Backend`].
    ///
    /// `POST /api/meter/update`
    pub async fn upsert_meter(
        &self,
        mac: &str,
        name: &str,
        number: u32,
    ) -> Result<UpsertMeterResponse, Error> {
        let url = self.api_url(&["meter", "update"])?;
        let body = UpsertMeterRequest {
            mac,
            name,
            number: format_meter_number(number),
        };
        debug!(mac, name, number = %body.number, "upserting meter");
        self.post(url, &body).await
    }

    /// Older rename route that skips the number uniqueness check.
    ///
    /// `POST /api/meters/{mac}/name`
    pub async fn rename_meter(
        &self,
        mac: &str,
        name: &str,
        number: u32,
    ) -> Result<StatusResponse, Error> {
        let url = self.api_url(&["meters", mac, "name"])?;
        let body = RenameMeterRequest {
            name,
            number: format_meter_number(number),
        };
        debug!(mac, name, "renaming meter (legacy route)");
        self.post(url, &body).await
    }

    /// Delete a meter and all of its data. A wrong `code` yields `403`.
    ///
    /// `DELETE /api/meters/{mac}`
    pub async fn delete_meter(&self, mac: &str, code: &str) -> Result<StatusResponse, Error> {
        let url = self.api_url(&["meters", mac])?;
        debug!(mac, "deleting meter");
        self.delete(url, &DeleteMeterRequest { code }).await
    }

    /// Publish a power command for a meter over the backend's MQTT link.
    ///
    /// `POST /api/meters/{mac}/on` / `POST /api/meters/{mac}/off`
    pub async fn set_power(&self, mac: &str, command: PowerCommand) -> Result<PowerResponse, Error> {
        let url = self.api_url(&["meters", mac, command.segment()])?;
        debug!(mac, command = command.segment(), "sending power command");
        self.post_empty(url).await
    }

    /// `POST /api/meters/{mac}/on`
    pub async fn power_on(&self, mac: &str) -> Result<PowerResponse, Error> {
        self.set_power(mac, PowerCommand::On).await
    }

    /// `POST /api/meters/{mac}/off`
    pub async fn power_off(&self, mac: &str) -> Result<PowerResponse, Error> {
        self.set_power(mac, PowerCommand::Off).await
    }
}
