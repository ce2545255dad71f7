//! Forecast command: k-minute occupancy outlook.

use std::io::Write;

use anyhow::Result;

use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, minutes: u32, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let report = engine.forecast(minutes)?;

    writeln!(
        writer,
        "Current: {}/{} (crowding {:?}, net rate {:+.2}/min)",
        report.current, report.max, report.crowd, report.net_rate
    )?;
    writeln!(
        writer,
        "Model: level {:.2}, trend {:+.3}, beta {:.3}, trained on {} observations",
        report.model.level, report.model.trend, report.model.beta, report.model.trained_on
    )?;
    writeln!(writer, "{:>5}  {:>9}  {:>10}", "+min", "occupancy", "confidence")?;
    for point in &report.forecasts {
        writeln!(
            writer,
            "{:>5}  {:>9}  {:>10.2}",
            point.minutes_ahead, point.occupancy, point.confidence
        )?;
    }
    Ok(())
}
