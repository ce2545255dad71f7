//! Scored command: open sessions in removal order with factor breakdowns.

use std::io::Write;

use anyhow::Result;

use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let scored = engine.list_scored()?;

    if scored.is_empty() {
        writeln!(writer, "No open sessions.")?;
        return Ok(());
    }

    for (rank, s) in scored.iter().enumerate() {
        writeln!(
            writer,
            "{:>3}. {} score {} (entered {}, deadline {}{})",
            rank + 1,
            s.session.occupant,
            s.score,
            s.session.entered_at,
            s.session.deadline,
            if s.privileged { ", privileged" } else { "" },
        )?;
        let f = &s.factors;
        writeln!(
            writer,
            "     T={:.2} R={:.2} O={:.2} L={:.2} F={:.2} P={:.2} A={:.2} G={:.2} V={:.2} D={:.2}",
            f.time_inside,
            f.remaining,
            f.entry_order,
            f.recency,
            f.frequency,
            f.privilege,
            f.age,
            f.demographic,
            f.cooperativeness,
            f.demand,
        )?;
    }
    Ok(())
}
