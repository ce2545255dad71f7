//! Turnstile CLI library.
//!
//! This crate provides the operator CLI and the long-running `serve` mode
//! for the occupancy engine.

mod cli;
pub mod commands;
mod config;

pub use cli::{CapacityAction, Cli, Commands, HistoryAction, OccupantAction, SetStatusArgs};
pub use config::Config;
