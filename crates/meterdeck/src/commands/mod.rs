//! Command dispatch: bridges CLI args -> controller actions -> output formatting.

pub mod config_cmd;
pub mod meters;
pub mod scan;
pub mod status;
pub mod util;
pub mod watch;

use meterdeck_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(controller, args, global).await,
        Command::Meters(args) => meters::handle(controller, args, global).await,
        Command::Scan => scan::handle(controller, global).await,
        Command::Watch(args) => watch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
