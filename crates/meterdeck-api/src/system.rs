// System endpoints
//
// Backend health, MQTT broker probe and the unnamed-meter scan.

use tracing::debug;

use crate::client::MeterClient;
use crate::error::Error;
use crate::models::{HealthResponse, MqttTestResponse, ScanResponse};

impl MeterClient {
    /// Database and MQTT connectivity as seen by the backend.
    ///
    /// `GET /api/health`
    pub async fn health(&self) -> Result<HealthResponse, Error> {
        let url = self.api_url(&["health"])?;
        debug!("checking backend health");
        self.get(url).await
    }

    /// Ask the backend to publish a test message to its broker.
    ///
    /// A broker that cannot be reached comes back as `503`.
    ///
    /// `GET /api/mqtt/test`
    pub async fn mqtt_test(&self) -> Result<MqttTestResponse, Error> {
        let url = self.api_url(&["mqtt", "test"])?;
        debug!("probing mqtt broker");
        self.get(url).await
    }

    /// Look for meters that report data but have no name yet.
    ///
    /// `POST /api/scan`
    pub async fn scan(&self) -> Result<ScanResponse, Error> {
        let url = self.api_url(&["scan"])?;
        debug!("scanning for unnamed meters");
        self.post_empty(url).await
    }
}
