//! Removal-score ranking for currently-inside occupants.
//!
//! When the space is full and someone new scans in, the admission
//! controller asks this module which existing session is least worth
//! keeping. Scoring is a pure function of the session, the occupant's
//! profile, and an explicit context; nothing here reads shared state, so
//! identical inputs always produce identical output.
//!
//! # Factors
//!
//! Ten factors, each normalized into \[0, 1\] where higher means more
//! removable: time already inside (T), remaining slot time (R), entry
//! order (O), recency of the last prior visit (L), monthly visit
//! frequency (F), privilege tier (P), age (A), a fixed demographic
//! placeholder (G), inverted cooperativeness (V), and time-of-day demand
//! (D). The weighted sum is rounded to three decimals and clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::occupant::OccupantProfile;
use crate::session::Session;
use crate::types::Score;

/// Weight configuration error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeightError {
    /// The weights do not sum to 1.0.
    #[error("rank weights must sum to 1.0, got {sum}")]
    BadSum { sum: f64 },
}

/// Per-factor weights. Must sum to 1.0; validated at engine startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankWeights {
    /// T: time already spent inside.
    pub time_inside: f64,
    /// R: remaining slot time.
    pub remaining: f64,
    /// O: entry order among those currently inside.
    pub entry_order: f64,
    /// L: recency of the last prior visit.
    pub recency: f64,
    /// F: monthly visit frequency.
    pub frequency: f64,
    /// P: privilege tier.
    pub privilege: f64,
    /// A: age-based factor.
    pub age: f64,
    /// G: demographic placeholder.
    pub demographic: f64,
    /// V: inverted cooperativeness.
    pub cooperativeness: f64,
    /// D: time-of-day demand.
    pub demand: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            time_inside: 0.20,
            remaining: 0.10,
            entry_order: 0.10,
            recency: 0.08,
            frequency: 0.08,
            privilege: 0.08,
            age: 0.05,
            demographic: 0.04,
            cooperativeness: 0.12,
            demand: 0.15,
        }
    }
}

impl RankWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.time_inside
            + self.remaining
            + self.entry_order
            + self.recency
            + self.frequency
            + self.privilege
            + self.age
            + self.demographic
            + self.cooperativeness
            + self.demand
    }

    /// Validates that the weights sum to 1.0 (within float tolerance).
    pub fn validate(&self) -> Result<(), WeightError> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(WeightError::BadSum { sum });
        }
        Ok(())
    }
}

/// Normalization constants for the factor formulas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankTuning {
    /// Minutes at which the time-inside factor saturates.
    pub t_max_minutes: f64,
    /// Minutes at which the remaining-time factor saturates.
    pub r_max_minutes: f64,
    /// Days over which last-visit recency decays to zero.
    pub recency_horizon_days: f64,
    /// Monthly visits at which the frequency factor bottoms out.
    pub frequency_saturation: f64,
    /// Age at which the age factor reaches zero.
    pub age_max: f64,
}

impl Default for RankTuning {
    fn default() -> Self {
        Self {
            t_max_minutes: 120.0,
            r_max_minutes: 120.0,
            recency_horizon_days: 30.0,
            frequency_saturation: 10.0,
            age_max: 70.0,
        }
    }
}

/// Everything the scorer needs beyond the session and profile.
///
/// The local hour is passed in explicitly (rather than derived from a
/// timezone lookup) so scoring stays deterministic under test clocks.
#[derive(Debug, Clone, Copy)]
pub struct RankContext<'a> {
    /// Current time.
    pub now: DateTime<Utc>,
    /// Hour of day (0..24) in the space's local timezone; drives demand.
    pub local_hour: u32,
    /// Number of occupants currently inside.
    pub total_inside: usize,
    /// Factor weights.
    pub weights: &'a RankWeights,
    /// Normalization constants.
    pub tuning: &'a RankTuning,
}

/// Normalized value of every factor, exposed to operators alongside the
/// total so a removal decision can be audited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FactorBreakdown {
    pub time_inside: f64,
    pub remaining: f64,
    pub entry_order: f64,
    pub recency: f64,
    pub frequency: f64,
    pub privilege: f64,
    pub age: f64,
    pub demographic: f64,
    pub cooperativeness: f64,
    pub demand: f64,
}

/// A session with its removal score and factor breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredSession {
    /// The scored session.
    pub session: Session,
    /// Whether the occupant holds privileged membership.
    pub privileged: bool,
    /// Total weighted score, rounded to 3 decimals, in \[0, 1\].
    pub score: Score,
    /// Per-factor normalized values.
    pub factors: FactorBreakdown,
}

/// Fixed value of the demographic placeholder factor.
///
/// Any non-neutral fairness policy must replace this constant through an
/// auditable code change, never a runtime flag.
const DEMOGRAPHIC_NEUTRAL: f64 = 0.5;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Demand factor for the given local hour.
///
/// Peak hours (09-12 and 17-20) make every occupant more removable because
/// the slot is worth more to the queue outside.
#[must_use]
pub fn demand_for_hour(local_hour: u32) -> f64 {
    match local_hour {
        9..=11 | 17..=19 => 1.0,
        8 | 20 => 0.5,
        _ => 0.2,
    }
}

/// Scores one session.
///
/// `entry_rank` is the 1-based position of this session in FIFO entry
/// order among everyone currently inside (1 = earliest). Pure: repeated
/// calls with identical inputs return identical results.
#[must_use]
pub fn score_session(
    session: &Session,
    profile: &OccupantProfile,
    entry_rank: usize,
    ctx: &RankContext<'_>,
) -> ScoredSession {
    let tuning = ctx.tuning;

    let elapsed = session.elapsed_minutes(ctx.now) as f64;
    let time_inside = clamp01(elapsed / tuning.t_max_minutes);

    let remaining_min = session.remaining_minutes(ctx.now) as f64;
    let remaining = clamp01(remaining_min / tuning.r_max_minutes);

    let entry_order = entry_rank as f64 / ctx.total_inside.max(1) as f64;

    let recency = match profile.last_visit {
        Some(last) => {
            let days_since = (ctx.now - last).num_seconds() as f64 / 86_400.0;
            clamp01(1.0 - days_since / tuning.recency_horizon_days)
        }
        None => 0.0,
    };

    let frequency =
        1.0 - clamp01(f64::from(profile.frequency_used) / tuning.frequency_saturation);

    let privilege = if profile.tier.is_privileged() { 0.0 } else { 1.0 };

    let age = match profile.age {
        Some(age) => clamp01((tuning.age_max - f64::from(age)) / tuning.age_max),
        None => 0.5,
    };

    let cooperativeness = clamp01(1.0 - profile.cooperativeness.value());

    let demand = demand_for_hour(ctx.local_hour);

    let factors = FactorBreakdown {
        time_inside,
        remaining,
        entry_order,
        recency,
        frequency,
        privilege,
        age,
        demographic: DEMOGRAPHIC_NEUTRAL,
        cooperativeness,
        demand,
    };

    let w = ctx.weights;
    let total = w.time_inside * factors.time_inside
        + w.remaining * factors.remaining
        + w.entry_order * factors.entry_order
        + w.recency * factors.recency
        + w.frequency * factors.frequency
        + w.privilege * factors.privilege
        + w.age * factors.age
        + w.demographic * factors.demographic
        + w.cooperativeness * factors.cooperativeness
        + w.demand * factors.demand;

    let rounded = (total * 1000.0).round() / 1000.0;

    ScoredSession {
        session: session.clone(),
        privileged: profile.tier.is_privileged(),
        score: Score::clamped(rounded),
        factors,
    }
}

/// Scores every session and returns them in removal order.
///
/// Input pairs need not be sorted; entry ranks are derived internally from
/// `(entered_at, seq)`. The output order is a strict total order: score
/// descending, then non-privileged first, then entry time ascending, then
/// sequence number ascending.
#[must_use]
pub fn rank_sessions(
    candidates: &[(Session, OccupantProfile)],
    ctx: &RankContext<'_>,
) -> Vec<ScoredSession> {
    // FIFO positions: rank 1 is the earliest entrant.
    let mut fifo: Vec<&Session> = candidates.iter().map(|(s, _)| s).collect();
    fifo.sort_by_key(|s| (s.entered_at, s.seq));

    let mut scored: Vec<ScoredSession> = candidates
        .iter()
        .map(|(session, profile)| {
            let entry_rank = fifo
                .iter()
                .position(|s| s.seq == session.seq)
                .map_or(1, |i| i + 1);
            score_session(session, profile, entry_rank, ctx)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .value()
            .total_cmp(&a.score.value())
            .then_with(|| {
                b.factors
                    .privilege
                    .total_cmp(&a.factors.privilege)
            })
            .then_with(|| a.session.entered_at.cmp(&b.session.entered_at))
            .then_with(|| a.session.seq.cmp(&b.session.seq))
    });
    scored
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use crate::types::{MembershipTier, OccupantId};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    fn session(name: &str, entered: DateTime<Utc>, seq: u64) -> Session {
        Session {
            occupant: OccupantId::new(name).unwrap(),
            entered_at: entered,
            deadline: entered + Duration::hours(1),
            seq,
        }
    }

    fn profile(name: &str, tier: MembershipTier) -> OccupantProfile {
        OccupantProfile::new(OccupantId::new(name).unwrap(), tier)
    }

    fn ctx<'a>(
        now: DateTime<Utc>,
        total: usize,
        weights: &'a RankWeights,
        tuning: &'a RankTuning,
    ) -> RankContext<'a> {
        RankContext {
            now,
            local_hour: 14,
            total_inside: total,
            weights,
            tuning,
        }
    }

    #[test]
    fn default_weights_sum_to_one() {
        RankWeights::default().validate().unwrap();
    }

    #[test]
    fn bad_weights_are_rejected() {
        let weights = RankWeights {
            demand: 0.5,
            ..RankWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn scoring_is_deterministic() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0() + Duration::minutes(45);
        let s = session("a", t0(), 0);
        let p = profile("a", MembershipTier::Regular);

        let first = score_session(&s, &p, 1, &ctx(now, 3, &weights, &tuning));
        let second = score_session(&s, &p, 1, &ctx(now, 3, &weights, &tuning));
        assert_eq!(first, second);
    }

    #[test]
    fn scores_stay_in_range() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0() + Duration::hours(5);

        let mut p = profile("a", MembershipTier::Regular);
        p.age = Some(95); // past age_max
        p.last_visit = Some(now - Duration::days(400));
        p.frequency_used = 40;

        let scored = score_session(&session("a", t0(), 0), &p, 1, &ctx(now, 1, &weights, &tuning));
        let value = scored.score.value();
        assert!((0.0..=1.0).contains(&value));
        for f in [
            scored.factors.time_inside,
            scored.factors.remaining,
            scored.factors.entry_order,
            scored.factors.recency,
            scored.factors.frequency,
            scored.factors.privilege,
            scored.factors.age,
            scored.factors.demographic,
            scored.factors.cooperativeness,
            scored.factors.demand,
        ] {
            assert!((0.0..=1.0).contains(&f), "factor out of range: {f}");
        }
    }

    #[test]
    fn score_is_rounded_to_three_decimals() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let scored = score_session(
            &session("a", t0(), 0),
            &profile("a", MembershipTier::Regular),
            1,
            &ctx(t0() + Duration::minutes(7), 3, &weights, &tuning),
        );
        let scaled = scored.score.value() * 1000.0;
        assert!((scaled - scaled.round()).abs() < 1e-9);
    }

    #[test]
    fn privilege_outranks_on_otherwise_equal_sessions() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0() + Duration::minutes(30);

        let candidates = vec![
            (session("priv", t0(), 0), profile("priv", MembershipTier::Privileged)),
            (session("reg", t0(), 1), profile("reg", MembershipTier::Regular)),
        ];
        let ranked = rank_sessions(&candidates, &ctx(now, 2, &weights, &tuning));
        assert_eq!(ranked[0].session.occupant.as_str(), "reg");
        assert!(ranked[0].score.value() > ranked[1].score.value());
    }

    #[test]
    fn permuting_input_does_not_change_individual_scores() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0() + Duration::minutes(50);

        let mut candidates = vec![
            (session("a", t0(), 0), profile("a", MembershipTier::Regular)),
            (session("b", t0() + Duration::minutes(10), 1), profile("b", MembershipTier::Regular)),
            (session("c", t0() + Duration::minutes(20), 2), profile("c", MembershipTier::Privileged)),
        ];

        let context = ctx(now, 3, &weights, &tuning);
        let forward = rank_sessions(&candidates, &context);
        candidates.reverse();
        let backward = rank_sessions(&candidates, &context);

        assert_eq!(forward, backward);
    }

    #[test]
    fn ordering_is_non_increasing_and_total() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0() + Duration::minutes(90);

        let candidates: Vec<(Session, OccupantProfile)> = (0..8)
            .map(|i| {
                let name = format!("u{i}");
                let tier = if i % 3 == 0 {
                    MembershipTier::Privileged
                } else {
                    MembershipTier::Regular
                };
                let mut p = profile(&name, tier);
                p.frequency_used = i;
                (
                    session(&name, t0() + Duration::minutes(i64::from(i) * 5), u64::from(i)),
                    p,
                )
            })
            .collect();

        let ranked = rank_sessions(&candidates, &ctx(now, 8, &weights, &tuning));
        for pair in ranked.windows(2) {
            assert!(pair[0].score.value() >= pair[1].score.value());
        }
        // Strict total order: ties broken deterministically down to seq.
        let seqs: Vec<u64> = ranked.iter().map(|s| s.session.seq).collect();
        let mut unique = seqs.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seqs.len());
    }

    #[test]
    fn tie_break_falls_back_to_fifo() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let now = t0();

        // Identical profiles and entry times; only seq differs. The O factor
        // differs by rank, so use a single pair entered at the same instant.
        let candidates = vec![
            (session("second", t0(), 5), profile("x", MembershipTier::Regular)),
            (session("first", t0(), 2), profile("x", MembershipTier::Regular)),
        ];
        let ranked = rank_sessions(&candidates, &ctx(now, 2, &weights, &tuning));
        // Equal scores are impossible here (entry order differs), so check
        // the derived FIFO ranks instead: seq 2 entered first.
        let first_rank_score = ranked
            .iter()
            .find(|s| s.session.seq == 2)
            .unwrap()
            .factors
            .entry_order;
        let second_rank_score = ranked
            .iter()
            .find(|s| s.session.seq == 5)
            .unwrap()
            .factors
            .entry_order;
        assert!(first_rank_score < second_rank_score);
    }

    #[test]
    fn demand_windows() {
        assert_eq!(demand_for_hour(9), 1.0);
        assert_eq!(demand_for_hour(11), 1.0);
        assert_eq!(demand_for_hour(17), 1.0);
        assert_eq!(demand_for_hour(19), 1.0);
        assert_eq!(demand_for_hour(8), 0.5);
        assert_eq!(demand_for_hour(20), 0.5);
        assert_eq!(demand_for_hour(12), 0.2);
        assert_eq!(demand_for_hour(2), 0.2);
        assert_eq!(demand_for_hour(21), 0.2);
    }

    #[test]
    fn unknown_attributes_use_documented_defaults() {
        let weights = RankWeights::default();
        let tuning = RankTuning::default();
        let p = profile("a", MembershipTier::Regular);
        let scored = score_session(
            &session("a", t0(), 0),
            &p,
            1,
            &ctx(t0(), 1, &weights, &tuning),
        );
        assert_eq!(scored.factors.age, 0.5);
        assert_eq!(scored.factors.recency, 0.0);
        // Fresh profile: frequency 0 means the factor is fully removable.
        assert_eq!(scored.factors.frequency, 1.0);
    }
}
