//! Set-status command: change the space status and schedule.

use std::io::Write;

use anyhow::{Context, Result};

use turnstile_core::status::{SpaceStatus, WallTime};

use crate::cli::SetStatusArgs;
use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, args: &SetStatusArgs, config: &Config) -> Result<()> {
    let status: SpaceStatus = args.status.parse()?;
    let auto_open = args
        .auto_open
        .as_deref()
        .map(WallTime::parse)
        .transpose()
        .context("invalid --auto-open")?;
    let auto_close = args
        .auto_close
        .as_deref()
        .map(WallTime::parse)
        .transpose()
        .context("invalid --auto-close")?;

    let engine = util::build_engine(config)?;
    let record = engine.set_status(
        status,
        args.message.clone(),
        auto_open,
        auto_close,
        args.auto_schedule,
        "operator",
    )?;

    writeln!(writer, "Status: {}", record.status)?;
    if let (Some(open), Some(close)) = (record.auto_open, record.auto_close) {
        writeln!(
            writer,
            "Schedule: {open}-{close} on weekdays ({})",
            if record.auto_schedule_enabled {
                "enabled"
            } else {
                "disabled"
            }
        )?;
    }
    Ok(())
}
