// ── Core error types ──
//
// User-facing errors from meterdeck-core. Consumers never match on HTTP
// plumbing directly; the `From<meterdeck_api::Error>` impl folds transport
// failures, backend error bodies and validation rejections into the
// variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Backend request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected to a backend")]
    Disconnected,

    #[error("Push channel failure: {reason}")]
    PushChannel { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Meter not found: {identifier}")]
    NotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    /// The backend understood the request and refused it (bad
    /// confirmation code, number already taken, missing fields).
    #[error("Rejected by backend: {message}")]
    Rejected {
        message: String,
        status: Option<u16>,
    },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Backend error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
        /// Raw response body, kept for diagnostics.
        body: Option<String>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status code supplied by the backend, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Api { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// What the store's last-error slot holds: a message for humans plus the
/// failure it was derived from.
#[derive(Debug, Clone)]
pub struct ActionError {
    pub message: String,
    pub cause: CoreError,
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.cause)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<meterdeck_api::Error> for CoreError {
    fn from(err: meterdeck_api::Error) -> Self {
        use meterdeck_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                        body: None,
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::InvalidBaseUrl(url) => CoreError::Config {
                message: format!("URL cannot be used as a backend base: {url}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Backend {
                status: 404,
                message,
                ..
            } => CoreError::NotFound {
                identifier: message,
            },
            ApiError::Backend {
                status: status @ (400 | 403 | 409 | 422),
                message,
                ..
            } => CoreError::Rejected {
                message,
                status: Some(status),
            },
            ApiError::Backend {
                status,
                message,
                body,
            } => CoreError::Api {
                message,
                status: Some(status),
                body: Some(body),
            },
            ApiError::Rejected { message, .. } => CoreError::Rejected {
                message,
                status: None,
            },
            ApiError::PushConnect(reason) | ApiError::PushProtocol(reason) => {
                CoreError::PushChannel { reason }
            }
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterdeck_api::Error as ApiError;

    #[test]
    fn wrong_delete_code_is_a_rejection() {
        let err = CoreError::from(ApiError::Backend {
            status: 403,
            message: "Ugyldig sikkerhedskode".into(),
            body: r#"{"error":"Ugyldig sikkerhedskode"}"#.into(),
        });
        assert!(matches!(
            err,
            CoreError::Rejected {
                status: Some(403),
                ..
            }
        ));
        assert_eq!(err.to_string(), "Rejected by backend: Ugyldig sikkerhedskode");
    }

    #[test]
    fn missing_meter_is_not_found() {
        let err = CoreError::from(ApiError::Backend {
            status: 404,
            message: "Måler ikke fundet".into(),
            body: String::new(),
        });
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn server_failures_keep_the_body() {
        let err = CoreError::from(ApiError::Backend {
            status: 503,
            message: "MQTT broker ikke tilgængelig".into(),
            body: "{}".into(),
        });
        let CoreError::Api { status, body, .. } = err else {
            panic!("expected Api error");
        };
        assert_eq!(status, Some(503));
        assert_eq!(body.as_deref(), Some("{}"));
    }

    #[test]
    fn timeouts_carry_the_ceiling() {
        let err = CoreError::from(ApiError::Timeout { timeout_secs: 10 });
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 10 }));
    }
}
