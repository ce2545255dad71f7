//! Remove command: evict the top-ranked sessions.

use std::io::Write;

use anyhow::Result;

use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, count: usize, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let removed = engine.force_remove_top(count)?;

    if removed.is_empty() {
        writeln!(writer, "No open sessions to remove.")?;
        return Ok(());
    }
    for session in &removed {
        writeln!(writer, "Removed {}", session.occupant)?;
    }
    writeln!(writer, "Occupancy: {}", engine.occupancy())?;
    Ok(())
}
