//! Shared utilities for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};

use turnstile_core::clock::SystemClock;
use turnstile_db::Database;
use turnstile_engine::SpaceEngine;

use crate::Config;

/// Opens the configured database, creating its parent directory if needed.
pub fn open_db(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }
    Database::open(
        &config.database_path,
        config.engine.default_max_capacity,
        chrono::Utc::now(),
    )
    .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Builds an engine over the configured database with the system clock.
///
/// Rebuilds the counter and restores open sessions, so one-shot commands
/// observe the same state the serve mode would.
pub fn build_engine(config: &Config) -> Result<SpaceEngine> {
    let db = open_db(config)?;
    SpaceEngine::new(db, config.engine.clone(), Arc::new(SystemClock))
        .context("failed to start the occupancy engine")
}
