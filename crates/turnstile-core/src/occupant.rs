//! Occupant profiles: the per-person attributes the engine owns.
//!
//! Registration and profile editing live outside the core; this module only
//! models the subset that feeds admission and removal scoring, plus the
//! cooperativeness history updated on every exit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MembershipTier, OccupantId, Score};

/// Cooperativeness score for an occupant with no exit history.
pub const DEFAULT_COOPERATIVENESS: f64 = 0.5;

/// Profile subset owned by the occupancy core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccupantProfile {
    /// Stable identity; equal to the scan token.
    pub id: OccupantId,
    /// Membership class.
    pub tier: MembershipTier,
    /// Age in years, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// Demographic category, if known. Feeds a fixed placeholder factor
    /// today; any non-neutral policy is an explicit ranker change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographic: Option<String>,
    /// Exponentially-smoothed history of compliant exits, in \[0, 1\].
    pub cooperativeness: Score,
    /// Entry count over the trailing 30 days, recomputed on entry.
    pub frequency_used: u32,
    /// When the occupant last left the space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit: Option<DateTime<Utc>>,
}

impl OccupantProfile {
    /// Creates a fresh profile with neutral history.
    #[must_use]
    pub fn new(id: OccupantId, tier: MembershipTier) -> Self {
        Self {
            id,
            tier,
            age: None,
            demographic: None,
            cooperativeness: Score::clamped(DEFAULT_COOPERATIVENESS),
            frequency_used: 0,
            last_visit: None,
        }
    }

    /// Applies the exit outcome to the cooperativeness history.
    ///
    /// A voluntary exit (before the deadline) pulls the score toward 1.0
    /// quickly; a forced exit (deadline elapsed, or eviction) decays it
    /// slowly toward 0.3. The asymmetry rewards leaving on time more
    /// aggressively than it punishes overstaying.
    pub fn record_exit(&mut self, outcome: ExitOutcome, at: DateTime<Utc>) {
        let old = self.cooperativeness.value();
        let new = match outcome {
            ExitOutcome::Voluntary => 0.8 * old + 0.2 * 1.0,
            ExitOutcome::Forced => 0.95 * old + 0.05 * 0.3,
        };
        self.cooperativeness = Score::clamped(new);
        self.last_visit = Some(at);
    }
}

/// How a session ended, for cooperativeness bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The occupant scanned out before the deadline.
    Voluntary,
    /// The session hit its deadline or was evicted to make room.
    Forced,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn voluntary_exit_pulls_toward_one() {
        let mut profile =
            OccupantProfile::new(OccupantId::new("alice").unwrap(), MembershipTier::Regular);
        profile.record_exit(ExitOutcome::Voluntary, at());

        // 0.8 * 0.5 + 0.2 * 1.0 = 0.6
        assert!((profile.cooperativeness.value() - 0.6).abs() < 1e-9);
        assert_eq!(profile.last_visit, Some(at()));
    }

    #[test]
    fn forced_exit_decays_toward_floor() {
        let mut profile =
            OccupantProfile::new(OccupantId::new("bob").unwrap(), MembershipTier::Regular);
        profile.record_exit(ExitOutcome::Forced, at());

        // 0.95 * 0.5 + 0.05 * 0.3 = 0.49
        assert!((profile.cooperativeness.value() - 0.49).abs() < 1e-9);
    }

    #[test]
    fn repeated_updates_stay_in_range() {
        let mut profile =
            OccupantProfile::new(OccupantId::new("carol").unwrap(), MembershipTier::Regular);
        for _ in 0..200 {
            profile.record_exit(ExitOutcome::Voluntary, at());
        }
        assert!(profile.cooperativeness.value() <= 1.0);
        assert!(profile.cooperativeness.value() > 0.99);

        for _ in 0..500 {
            profile.record_exit(ExitOutcome::Forced, at());
        }
        let settled = profile.cooperativeness.value();
        assert!(settled >= 0.3 - 1e-6);
        assert!(settled < 0.31);
    }
}
