// Meter backend HTTP client
//
// Wraps `reqwest::Client` with URL construction under `/api` and uniform
// response normalization. Endpoint methods live in `meters.rs` and
// `system.rs` as inherent methods so this module stays about transport.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Longest slice of a non-JSON error body carried into an error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Raw HTTP client for the meter backend.
///
/// Every call yields either the decoded payload or one normalized
/// [`Error`]; callers never see a `reqwest::Response`.
#[derive(Debug, Clone)]
pub struct MeterClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl MeterClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root (e.g. `http://192.168.1.50:5000`);
    /// every endpoint is resolved beneath `{base_url}/api/`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, timeout_secs: u64) -> Self {
        Self {
            http,
            base_url,
            timeout_secs,
        }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.push("api");
            path.extend(segments);
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_response(resp).await
    }

    /// Send a POST request with a JSON body.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_response(resp).await
    }

    /// Send a POST request without a body.
    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_response(resp).await
    }

    /// Send a DELETE request with a JSON body.
    pub(crate) async fn delete<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("DELETE {}", url);

        let resp = self
            .http
            .delete(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.parse_response(resp).await
    }

    fn map_transport(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Normalize a response: non-2xx becomes `Backend`, a 2xx body with
    /// `"status": "error"` becomes `Rejected`, anything else is decoded.
    async fn parse_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_transport(e))?;
        let json: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = json
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| preview(&body, status));
            debug!(status = status.as_u16(), %message, "backend returned an error");
            return Err(Error::Backend {
                status: status.as_u16(),
                message,
                body,
            });
        }

        let Some(json) = json else {
            return Err(Error::Deserialization {
                message: "response body is not JSON".into(),
                body,
            });
        };

        if json.get("status").and_then(Value::as_str) == Some("error") {
            let message = error_message(&json).unwrap_or_else(|| "request rejected".into());
            return Err(Error::Rejected { message, body });
        }

        serde_json::from_value(json).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Lift the `error` or `message` string out of a JSON body.
fn error_message(json: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn preview(body: &str, status: reqwest::StatusCode) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_owned();
    }
    trimmed.chars().take(ERROR_BODY_PREVIEW).collect()
}
