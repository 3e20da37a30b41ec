//! Clap derive structures for the `meterdeck` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// meterdeck -- watch and control metered power outlets
#[derive(Debug, Parser)]
#[command(
    name = "meterdeck",
    version,
    about = "Manage metered power outlets from the command line",
    long_about = "Lists, names, switches and deletes energy meters known to a meterdeck\n\
        backend, shows their readings, and follows live updates from the\n\
        backend's push channel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "METERDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'b', env = "METERDECK_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "METERDECK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds, at most 10 [default: profile setting, else 10]
    #[arg(long, env = "METERDECK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Backend, database and MQTT health
    #[command(alias = "st")]
    Status(StatusArgs),

    /// List, inspect and control meters
    #[command(alias = "m")]
    Meters(MetersArgs),

    /// Ask the backend to look for new meters
    Scan,

    /// Follow live meter updates from the push channel
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Also probe the backend's MQTT broker
    #[arg(long)]
    pub mqtt: bool,
}

// ── Meters ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MetersArgs {
    #[command(subcommand)]
    pub command: MetersCommand,
}

#[derive(Debug, Subcommand)]
pub enum MetersCommand {
    /// List named meters
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one meter's details
    Get {
        /// Meter MAC address
        mac: String,
    },

    /// Show recent readings, newest first
    Readings {
        /// Meter MAC address
        mac: String,

        /// How many readings to fetch (1-200)
        #[arg(long, short = 'l', default_value = "50")]
        limit: u32,
    },

    /// Show daily consumption
    Daily {
        /// Meter MAC address
        mac: String,

        /// How many days back (1-365)
        #[arg(long, short = 'd', default_value = "30")]
        days: u32,
    },

    /// Give a meter a name and number
    Name {
        /// Meter MAC address
        mac: String,
        /// Display name
        name: String,
        /// Meter number (0-999, shown as three digits)
        number: u32,
    },

    /// Rename a meter through the older rename route
    Rename {
        /// Meter MAC address
        mac: String,
        /// Display name
        name: String,
        /// Meter number (0-999, shown as three digits)
        number: u32,
    },

    /// Delete a meter and its readings
    #[command(alias = "rm")]
    Delete {
        /// Meter MAC address
        mac: String,

        /// Confirmation code required by the backend
        #[arg(long, env = "METERDECK_DELETE_CODE", hide_env_values = true)]
        code: String,
    },

    /// Switch a meter's relay on
    On {
        /// Meter MAC address
        mac: String,
    },

    /// Switch a meter's relay off
    Off {
        /// Meter MAC address
        mac: String,
    },
}

/// Filter and pagination arguments for `meters list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Case-insensitive match on name, number or MAC
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Only meters that are online
    #[arg(long, short = 'a')]
    pub active: bool,

    /// Page to show (1-based)
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Meters per page (defaults to the profile's page size)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Ignore pagination and show every match
    #[arg(long, conflicts_with_all = ["page", "page_size"])]
    pub all: bool,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    pub duration: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the current configuration
    Show,

    /// Create or extend the config file interactively
    Init,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
