//! History commands: export the visit log, import forecaster observations.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use turnstile_db::ObservationRow;

use crate::commands::util;
use crate::Config;

/// Writes the visit log to `writer` as JSON lines.
pub fn export<W: Write>(writer: &mut W, config: &Config) -> Result<usize> {
    let db = util::open_db(config)?;
    let visits = db.list_visits()?;
    for visit in &visits {
        let line = serde_json::to_string(&visit.event).context("failed to serialize event")?;
        writeln!(writer, "{line}")?;
    }
    Ok(visits.len())
}

/// Reads observation JSON lines from `reader` and loads them into the
/// store and the forecaster. Returns the number of rows loaded.
pub fn import<R: BufRead>(reader: R, config: &Config) -> Result<usize> {
    let rows = parse_observations(reader)?;
    let engine = util::build_engine(config)?;
    let loaded = engine.ingest_history(&rows)?;
    Ok(loaded)
}

fn parse_observations<R: BufRead>(reader: R) -> Result<Vec<ObservationRow>> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportObservation = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        rows.push(ObservationRow {
            timestamp: parsed.timestamp,
            occupancy: parsed.occupancy,
            entry_rate: parsed.entry_rate,
            exit_rate: parsed.exit_rate,
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct ImportObservation {
    timestamp: DateTime<Utc>,
    occupancy: f64,
    #[serde(default)]
    entry_rate: f64,
    #[serde(default)]
    exit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_observation_lines_skipping_blanks() {
        let input = "\
{\"timestamp\":\"2025-03-03T09:00:00Z\",\"occupancy\":12,\"entry_rate\":0.5,\"exit_rate\":0.2}

{\"timestamp\":\"2025-03-03T09:01:00Z\",\"occupancy\":13}
";
        let rows = parse_observations(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].occupancy, 12.0);
        assert!((rows[0].net_rate() - 0.3).abs() < 1e-12);
        assert_eq!(rows[1].entry_rate, 0.0);
    }

    #[test]
    fn rejects_malformed_lines() {
        let input = "{\"timestamp\":\"not a time\",\"occupancy\":1}";
        assert!(parse_observations(input.as_bytes()).is_err());
    }
}
