// ── Runtime connection configuration ──
//
// Describes *how* to reach a meter backend. Never touches disk; the CLI
// builds a `BackendConfig` from its profile and hands it in.

use std::time::Duration;

use url::Url;

/// Configuration for talking to a single backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend root URL (e.g., `http://192.168.1.50:5000`).
    pub url: Url,
    /// Ceiling on every REST call.
    pub timeout: Duration,
    /// Spawn the Socket.IO push channel on connect.
    pub push_enabled: bool,
    /// Consecutive failed push reconnects before giving up. `None` = forever.
    pub reconnect_attempts: Option<u32>,
    /// Fixed pause between push reconnects.
    pub reconnect_delay: Duration,
    /// Initial page size for the derived meter view.
    pub page_size: usize,
    /// Accept self-signed certificates on `https` backends.
    pub accept_invalid_certs: bool,
}

impl BackendConfig {
    /// Defaults for everything except the URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(10),
            push_enabled: true,
            reconnect_attempts: Some(10),
            reconnect_delay: Duration::from_secs(1),
            page_size: crate::view::DEFAULT_PAGE_SIZE,
            accept_invalid_certs: false,
        }
    }
}
