//! Scan command: process one turnstile scan.

use std::io::Write;

use anyhow::Result;

use turnstile_engine::ScanOutcome;

use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, token: &str, config: &Config) -> Result<()> {
    let engine = util::build_engine(config)?;
    let outcome = engine.handle_scan(token)?;

    match &outcome {
        ScanOutcome::Admitted { session } => {
            writeln!(
                writer,
                "Admitted {} until {} ({} minutes)",
                session.occupant, session.deadline, session.remaining_minutes
            )?;
        }
        ScanOutcome::Exited { session } => {
            writeln!(writer, "Exited {}", session.occupant)?;
        }
        ScanOutcome::RejectedClosed { status, message } => {
            writeln!(
                writer,
                "Rejected: space is {status}{}",
                message
                    .as_deref()
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default()
            )?;
        }
        ScanOutcome::RejectedFullAndUnremovable => {
            writeln!(writer, "Rejected: space is full and nobody can be removed")?;
        }
        ScanOutcome::InvalidToken => {
            writeln!(writer, "Rejected: unknown token")?;
        }
    }
    Ok(())
}
