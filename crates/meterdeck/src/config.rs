//! CLI configuration: thin wrapper around `meterdeck_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--backend, --timeout).

use meterdeck_core::BackendConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use meterdeck_config::{
    Config, Profile, bounded_timeout, config_path, load_config_or_default, parse_backend_url,
    profile_to_backend_config, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `BackendConfig` from the config file, the active profile and
/// the CLI flags. Flags win over profile values; the timeout is held
/// under the ceiling either way.
pub fn resolve_backend_config(global: &GlobalOpts, cfg: &Config) -> Result<BackendConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut backend = match cfg.profiles.get(&profile_name) {
        Some(profile) => {
            let mut profile = profile.clone();
            if let Some(ref url) = global.backend {
                profile.backend.clone_from(url);
            }
            profile_to_backend_config(&profile, &cfg.defaults)?
        }
        None => {
            // An explicitly requested profile has to exist.
            if global.profile.is_some() {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available_profiles(cfg),
                });
            }
            // No profile: fall back to --backend / METERDECK_BACKEND alone.
            let url = global.backend.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let mut backend = BackendConfig::new(parse_backend_url(url)?);
            backend.timeout = bounded_timeout(cfg.defaults.timeout);
            backend
        }
    };

    if let Some(secs) = global.timeout {
        backend.timeout = bounded_timeout(secs);
    }
    Ok(backend)
}

/// Comma-separated profile names for help text.
pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
