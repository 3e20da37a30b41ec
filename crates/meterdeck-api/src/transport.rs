// Shared transport configuration for building reqwest::Client instances.
//
// The REST client and anything else that talks HTTP to the backend share
// timeout and user-agent settings through this module.

use std::time::Duration;

/// Hard ceiling on any single REST call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("meterdeck/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Accept self-signed certificates on `https` backends.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder()
            .timeout(self.effective_timeout())
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(crate::error::Error::Transport)
    }

    /// The configured timeout, never above [`DEFAULT_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.min(DEFAULT_TIMEOUT)
    }

    /// Timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.effective_timeout().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_ten_seconds() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.timeout_secs(), 10);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn timeout_is_capped_at_ceiling() {
        let config = TransportConfig {
            timeout: Duration::from_secs(60),
            ..TransportConfig::default()
        };
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.timeout_secs(), 10);

        let short = TransportConfig {
            timeout: Duration::from_secs(3),
            ..TransportConfig::default()
        };
        assert_eq!(short.timeout_secs(), 3);
    }

    #[test]
    fn builds_a_client() {
        assert!(TransportConfig::default().build_client().is_ok());
    }
}
