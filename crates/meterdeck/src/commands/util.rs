//! Shared helpers for command handlers.

use std::io::IsTerminal;

use meterdeck_core::Controller;

use crate::error::CliError;

/// Surface the store's last-error slot after an action returned its
/// failure sentinel.
pub fn ensure_ok(controller: &Controller) -> Result<(), CliError> {
    match controller.store().last_error() {
        Some(err) => Err(CliError::from_action(&err)),
        None => Ok(()),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(action: &str, message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Meter numbers are three digits on the backend.
pub fn check_number(number: u32) -> Result<(), CliError> {
    if (0..=999).contains(&number) {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: "number".into(),
            reason: format!("{number} is outside 000-999"),
        })
    }
}

/// Names must carry at least one visible character.
pub fn check_name(name: &str) -> Result<(), CliError> {
    if name.trim().is_empty() {
        Err(CliError::Validation {
            field: "name".into(),
            reason: "name cannot be empty".into(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_numbers_are_bounded() {
        assert!(check_number(0).is_ok());
        assert!(check_number(999).is_ok());
        assert!(check_number(1000).is_err());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(check_name("Kontor").is_ok());
        assert!(check_name("   ").is_err());
    }
}
