//! Occupant commands: seed and inspect profiles.
//!
//! Full registration lives outside the engine; this only writes the
//! profile subset the core owns.

use std::io::Write;

use anyhow::Result;

use turnstile_core::occupant::OccupantProfile;
use turnstile_core::types::{MembershipTier, OccupantId};

use crate::cli::OccupantAction;
use crate::commands::util;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, action: &OccupantAction, config: &Config) -> Result<()> {
    match action {
        OccupantAction::Add {
            id,
            tier,
            age,
            demographic,
        } => {
            let id = OccupantId::new(id.clone())?;
            let tier: MembershipTier = tier.parse()?;
            let mut profile = OccupantProfile::new(id.clone(), tier);
            profile.age = *age;
            profile.demographic = demographic.clone();

            let mut db = util::open_db(config)?;
            db.upsert_occupant(&profile)?;
            writeln!(writer, "Registered {id} ({tier})")?;
        }
        OccupantAction::List => {
            let db = util::open_db(config)?;
            let occupants = db.list_occupants()?;
            if occupants.is_empty() {
                writeln!(writer, "No occupants registered.")?;
                return Ok(());
            }
            for p in occupants {
                writeln!(
                    writer,
                    "{} tier={} cooperativeness={} visits/month={}{}",
                    p.id,
                    p.tier,
                    p.cooperativeness,
                    p.frequency_used,
                    p.last_visit
                        .map(|t| format!(" last_visit={t}"))
                        .unwrap_or_default(),
                )?;
            }
        }
    }
    Ok(())
}
