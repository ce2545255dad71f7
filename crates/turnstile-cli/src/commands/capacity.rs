//! Capacity commands: set the cap, adjust the counter.

use std::io::Write;

use anyhow::{bail, Result};

use turnstile_engine::AdjustMode;

use crate::cli::CapacityAction;
use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, action: &CapacityAction, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let snapshot = match action {
        CapacityAction::Set { max } => engine.set_max_capacity(*max)?,
        CapacityAction::Adjust { add, remove, to } => {
            let mode = match (add, remove, to) {
                (Some(n), None, None) => AdjustMode::Increase(*n),
                (None, Some(n), None) => AdjustMode::Decrease(*n),
                (None, None, Some(n)) => AdjustMode::Set(*n),
                _ => bail!("exactly one of --add, --remove, --to is required"),
            };
            engine.adjust_occupancy(mode)?
        }
    };
    writeln!(
        writer,
        "Occupancy: {}/{} ({:.0}%)",
        snapshot.count, snapshot.max, snapshot.percent
    )?;
    Ok(())
}
