//! Status command: show occupancy, capacity, and space status.

use std::io::Write;

use anyhow::Result;

use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let snapshot = engine.get_state()?;

    writeln!(
        writer,
        "Occupancy: {}/{} ({:.0}%)",
        snapshot.count, snapshot.max, snapshot.percent
    )?;
    writeln!(writer, "Crowding: {:?}", snapshot.crowd)?;
    writeln!(
        writer,
        "Status: {}{}",
        snapshot.status,
        snapshot
            .message
            .as_deref()
            .map(|m| format!(" - {m}"))
            .unwrap_or_default()
    )?;
    if !snapshot.persistence_ok {
        writeln!(writer, "WARNING: persistence is failing")?;
    }
    writeln!(writer, "Last update: {}", snapshot.last_update)?;
    Ok(())
}
