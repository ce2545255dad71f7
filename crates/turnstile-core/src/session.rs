//! Open-visit sessions and the in-memory registry of who is inside.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::OccupantId;

/// Registry errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    /// The occupant already has an open session.
    #[error("occupant {0} is already inside")]
    AlreadyInside(OccupantId),

    /// The occupant has no open session.
    #[error("occupant {0} is not inside")]
    NotInside(OccupantId),
}

/// An open visit, from entry until its closing exit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// The occupant this session belongs to.
    pub occupant: OccupantId,
    /// When the occupant entered.
    pub entered_at: DateTime<Utc>,
    /// When the session becomes eligible for auto-exit.
    pub deadline: DateTime<Utc>,
    /// Admission order within this process lifetime; FIFO tie-breaker.
    pub seq: u64,
}

impl Session {
    /// Minutes spent inside as of `now`, never negative.
    #[must_use]
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entered_at).num_minutes().max(0)
    }

    /// Minutes until the deadline as of `now`, never negative.
    #[must_use]
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_minutes().max(0)
    }

    /// Whether the session's deadline has elapsed as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }
}

/// Index of currently-open sessions.
///
/// A flat map keyed by occupant id; ordered views are produced on demand by
/// sorting on `(entered_at, seq)`, which is a stable FIFO order because
/// sequence numbers are unique and monotone.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    open: HashMap<OccupantId, Session>,
    next_seq: u64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `occupant`, assigning the next sequence number.
    ///
    /// Fails with [`RegistryError::AlreadyInside`] if the occupant already
    /// has an open session; the registry is unchanged in that case.
    pub fn open(
        &mut self,
        occupant: OccupantId,
        entered_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<u64, RegistryError> {
        if self.open.contains_key(&occupant) {
            return Err(RegistryError::AlreadyInside(occupant));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.open.insert(
            occupant.clone(),
            Session {
                occupant,
                entered_at,
                deadline,
                seq,
            },
        );
        Ok(seq)
    }

    /// Closes and returns the occupant's open session.
    pub fn close(&mut self, occupant: &OccupantId) -> Result<Session, RegistryError> {
        self.open
            .remove(occupant)
            .ok_or_else(|| RegistryError::NotInside(occupant.clone()))
    }

    /// Returns the occupant's open session, if any.
    #[must_use]
    pub fn lookup(&self, occupant: &OccupantId) -> Option<&Session> {
        self.open.get(occupant)
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// All open sessions in FIFO order (entry time, then sequence number).
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.open.values().cloned().collect();
        sessions.sort_by_key(|s| (s.entered_at, s.seq));
        sessions
    }

    /// Sessions whose deadline is at or before `t`, ascending by deadline.
    ///
    /// The deadline ordering keeps synthesized exit events as chronological
    /// as possible when several sessions expire between sweeps.
    #[must_use]
    pub fn expired_as_of(&self, t: DateTime<Utc>) -> Vec<Session> {
        let mut expired: Vec<Session> = self
            .open
            .values()
            .filter(|s| s.is_expired(t))
            .cloned()
            .collect();
        expired.sort_by_key(|s| (s.deadline, s.seq));
        expired
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn id(s: &str) -> OccupantId {
        OccupantId::new(s).unwrap()
    }

    #[test]
    fn open_assigns_monotone_sequence_numbers() {
        let mut reg = SessionRegistry::new();
        let a = reg.open(id("a"), t0(), t0() + Duration::hours(1)).unwrap();
        let b = reg.open(id("b"), t0(), t0() + Duration::hours(1)).unwrap();
        assert!(b > a);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn open_rejects_double_entry() {
        let mut reg = SessionRegistry::new();
        reg.open(id("a"), t0(), t0() + Duration::hours(1)).unwrap();
        let err = reg
            .open(id("a"), t0() + Duration::minutes(1), t0() + Duration::hours(2))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyInside(id("a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn close_returns_the_session() {
        let mut reg = SessionRegistry::new();
        reg.open(id("a"), t0(), t0() + Duration::hours(1)).unwrap();
        let session = reg.close(&id("a")).unwrap();
        assert_eq!(session.occupant, id("a"));
        assert!(reg.is_empty());

        let err = reg.close(&id("a")).unwrap_err();
        assert_eq!(err, RegistryError::NotInside(id("a")));
    }

    #[test]
    fn list_is_fifo_by_entry_then_seq() {
        let mut reg = SessionRegistry::new();
        // Same entry time: seq breaks the tie.
        reg.open(id("b"), t0(), t0() + Duration::hours(1)).unwrap();
        reg.open(id("c"), t0(), t0() + Duration::hours(1)).unwrap();
        reg.open(id("a"), t0() - Duration::minutes(10), t0() + Duration::hours(1))
            .unwrap();

        let order: Vec<String> = reg
            .list()
            .into_iter()
            .map(|s| s.occupant.to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn expired_as_of_is_ascending_by_deadline() {
        let mut reg = SessionRegistry::new();
        reg.open(id("late"), t0(), t0() + Duration::minutes(90)).unwrap();
        reg.open(id("soon"), t0(), t0() + Duration::minutes(30)).unwrap();
        reg.open(id("fresh"), t0(), t0() + Duration::hours(3)).unwrap();

        let expired = reg.expired_as_of(t0() + Duration::hours(2));
        let order: Vec<String> = expired.iter().map(|s| s.occupant.to_string()).collect();
        assert_eq!(order, ["soon", "late"]);
    }

    #[test]
    fn deadline_boundary_counts_as_expired() {
        let mut reg = SessionRegistry::new();
        let deadline = t0() + Duration::hours(1);
        reg.open(id("a"), t0(), deadline).unwrap();
        assert_eq!(reg.expired_as_of(deadline).len(), 1);
        assert!(reg.expired_as_of(deadline - Duration::seconds(1)).is_empty());
    }

    #[test]
    fn remaining_and_elapsed_clamp_at_zero() {
        let session = Session {
            occupant: id("a"),
            entered_at: t0(),
            deadline: t0() + Duration::hours(1),
            seq: 0,
        };
        assert_eq!(session.elapsed_minutes(t0() - Duration::minutes(5)), 0);
        assert_eq!(session.remaining_minutes(t0() + Duration::hours(2)), 0);
        assert_eq!(session.elapsed_minutes(t0() + Duration::minutes(30)), 30);
        assert_eq!(session.remaining_minutes(t0() + Duration::minutes(30)), 30);
    }
}
