//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Occupancy control for a shared, capacity-bounded space.
///
/// Tracks who is inside, enforces the capacity cap, time-boxes visits,
/// evicts the least-valuable occupant when the space is full, and
/// forecasts near-term occupancy.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the engine with its background workers until interrupted.
    ///
    /// Notifications are emitted to stdout as JSON lines.
    Serve,

    /// Process a turnstile scan for the given token.
    Scan {
        /// The opaque scan token (occupant id).
        token: String,
    },

    /// Show current occupancy and space status.
    Status,

    /// Manage the capacity configuration.
    Capacity {
        #[command(subcommand)]
        action: CapacityAction,
    },

    /// Change the space status and auto open/close schedule.
    SetStatus(SetStatusArgs),

    /// Forecast occupancy for the next N minutes (10-60).
    Forecast {
        /// Horizon in minutes.
        #[arg(default_value_t = 30)]
        minutes: u32,
    },

    /// List open sessions with removal scores and factor breakdowns.
    Scored,

    /// Evict the top N sessions by removal score.
    Remove {
        /// How many sessions to remove.
        count: usize,
    },

    /// Manage occupant profiles.
    Occupant {
        #[command(subcommand)]
        action: OccupantAction,
    },

    /// Export or import engine history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

/// Capacity subcommands.
#[derive(Debug, Subcommand)]
pub enum CapacityAction {
    /// Set the maximum capacity (1-10000).
    Set {
        /// New maximum capacity.
        max: u32,
    },

    /// Adjust the occupancy counter (operator drift correction).
    Adjust {
        /// Add to the counter.
        #[arg(long, conflicts_with_all = ["remove", "to"])]
        add: Option<u32>,

        /// Subtract from the counter.
        #[arg(long, conflicts_with = "to")]
        remove: Option<u32>,

        /// Set the counter to an absolute value.
        #[arg(long)]
        to: Option<u32>,
    },
}

/// Arguments for `set-status`.
#[derive(Debug, Args)]
pub struct SetStatusArgs {
    /// New status: open, closed, or maintenance.
    pub status: String,

    /// Message shown alongside rejections.
    #[arg(long)]
    pub message: Option<String>,

    /// Weekday auto-open time (HH:MM).
    #[arg(long)]
    pub auto_open: Option<String>,

    /// Weekday auto-close time (HH:MM).
    #[arg(long)]
    pub auto_close: Option<String>,

    /// Enable the auto open/close schedule.
    #[arg(long)]
    pub auto_schedule: bool,
}

/// Occupant subcommands.
#[derive(Debug, Subcommand)]
pub enum OccupantAction {
    /// Register an occupant profile.
    Add {
        /// Occupant id (scan token).
        id: String,

        /// Membership tier: privileged or regular.
        #[arg(long, default_value = "regular")]
        tier: String,

        /// Age in years.
        #[arg(long)]
        age: Option<u32>,

        /// Demographic category.
        #[arg(long)]
        demographic: Option<String>,
    },

    /// List registered occupants.
    List,
}

/// History subcommands.
#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// Export the visit log to stdout as JSON lines.
    Export,

    /// Import forecaster observations from stdin as JSON lines.
    ///
    /// Each line: {"timestamp": "...", "occupancy": N,
    /// "entry_rate": X, "exit_rate": Y}
    Import,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn capacity_adjust_flags_conflict() {
        let result = Cli::try_parse_from([
            "turnstile", "capacity", "adjust", "--add", "2", "--to", "5",
        ]);
        assert!(result.is_err());
    }
}
