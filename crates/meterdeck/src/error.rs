//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants and failed store actions into user-facing
//! errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use meterdeck_config::ConfigError;
use meterdeck_core::{ActionError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the backend at {url}")]
    #[diagnostic(
        code(meterdeck::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Reason: {reason}\n\
             Try: meterdeck status --backend {url}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(meterdeck::timeout),
        help("Check backend responsiveness. Calls give up after at most 10 seconds.")
    )]
    Timeout { seconds: u64 },

    // ── Backend results ──────────────────────────────────────────────

    #[error("{action}: meter '{identifier}' not found")]
    #[diagnostic(
        code(meterdeck::not_found),
        help("Run: meterdeck meters list to see known meters")
    )]
    NotFound { action: String, identifier: String },

    #[error("{action}: {message}")]
    #[diagnostic(code(meterdeck::rejected))]
    Rejected { action: String, message: String },

    #[error("{action}: {message}")]
    #[diagnostic(code(meterdeck::backend))]
    Backend { action: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(meterdeck::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(meterdeck::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: meterdeck config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(meterdeck::no_config),
        help(
            "Create a profile with: meterdeck config init\n\
             Or pass --backend / set METERDECK_BACKEND.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(meterdeck::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(meterdeck::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Turn the store's last-error slot into a CLI error, keeping the
    /// action message as context.
    pub fn from_action(err: &ActionError) -> Self {
        let action = err.message.clone();
        match &err.cause {
            CoreError::NotFound { identifier } => Self::NotFound {
                action,
                identifier: identifier.clone(),
            },
            CoreError::Rejected { message, .. } => Self::Rejected {
                action,
                message: message.clone(),
            },
            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: format!("{action}: {message}"),
            },
            other => match Self::from(other.clone()) {
                Self::Backend { message, .. } => Self::Backend { action, message },
                mapped => mapped,
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::Disconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "Backend connection was lost".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotFound { identifier } => CliError::NotFound {
                action: "Lookup failed".into(),
                identifier,
            },

            CoreError::Rejected { message, .. } => CliError::Rejected {
                action: "Rejected by backend".into(),
                message,
            },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "backend".into(),
                reason: message,
            },

            CoreError::Api {
                message, status, ..
            } => CliError::Backend {
                action: status.map_or_else(
                    || "Backend error".into(),
                    |code| format!("Backend error (HTTP {code})"),
                ),
                message,
            },

            CoreError::PushChannel { reason } => CliError::Backend {
                action: "Push channel failure".into(),
                message: reason,
            },

            CoreError::Internal(message) => CliError::Backend {
                action: "Internal error".into(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(message: &str, cause: CoreError) -> ActionError {
        ActionError {
            message: message.into(),
            cause,
        }
    }

    #[test]
    fn wrong_delete_code_exits_as_rejected() {
        let err = CliError::from_action(&action(
            "Could not delete meter",
            CoreError::Rejected {
                message: "Ugyldig sikkerhedskode".into(),
                status: Some(403),
            },
        ));
        assert_eq!(err.exit_code(), exit_code::REJECTED);
        assert_eq!(
            err.to_string(),
            "Could not delete meter: Ugyldig sikkerhedskode"
        );
    }

    #[test]
    fn unreachable_backend_exits_as_connection() {
        let err = CliError::from_action(&action(
            "Could not load meters",
            CoreError::ConnectionFailed {
                url: "http://127.0.0.1:9".into(),
                reason: "connection refused".into(),
            },
        ));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn server_errors_keep_the_action() {
        let err = CliError::from_action(&action(
            "Could not load meters",
            CoreError::Api {
                message: "database unavailable".into(),
                status: Some(500),
                body: None,
            },
        ));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
        assert_eq!(err.to_string(), "Could not load meters: database unavailable");
    }

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(
            CliError::from(CoreError::Timeout { timeout_secs: 10 }).exit_code(),
            exit_code::TIMEOUT
        );
        assert_eq!(
            CliError::from(CoreError::NotFound {
                identifier: "aa:bb".into()
            })
            .exit_code(),
            exit_code::NOT_FOUND
        );
        assert_eq!(
            CliError::Validation {
                field: "number".into(),
                reason: "out of range".into()
            }
            .exit_code(),
            exit_code::USAGE
        );
    }
}
