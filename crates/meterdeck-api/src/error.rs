use thiserror::Error;

/// Top-level error type for the `meterdeck-api` crate.
///
/// Covers every failure mode across both surfaces: the REST API and the
/// Socket.IO push channel. `meterdeck-core` maps these into user-facing
/// diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL cannot carry path segments (e.g. `mailto:`).
    #[error("URL cannot be used as a backend base: {0}")]
    InvalidBaseUrl(String),

    /// Request hit the client-side timeout ceiling.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Backend ─────────────────────────────────────────────────────
    /// Non-2xx response. `message` is lifted from the `error`/`message`
    /// field of the JSON body when present.
    #[error("Backend error (HTTP {status}): {message}")]
    Backend {
        status: u16,
        message: String,
        body: String,
    },

    /// 2xx response whose body reports `"status": "error"`.
    #[error("Backend rejected request: {message}")]
    Rejected { message: String, body: String },

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("Push channel connection failed: {0}")]
    PushConnect(String),

    /// The Socket.IO handshake or framing was not what we expected.
    #[error("Push channel protocol error: {0}")]
    PushProtocol(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::PushConnect(_) => true,
            Self::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend { status: 404, .. })
    }

    /// HTTP status code supplied by the backend, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Raw response body supplied by the backend, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Backend { body, .. }
            | Self::Rejected { body, .. }
            | Self::Deserialization { body, .. } => Some(body),
            _ => None,
        }
    }
}
