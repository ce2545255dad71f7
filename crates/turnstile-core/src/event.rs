//! Visit events: the append-only record of every entry and exit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::OccupantId;

/// Direction of a visit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitKind {
    /// The occupant entered the space.
    Entry,
    /// The occupant left the space (voluntarily, evicted, or expired).
    Exit,
}

impl VisitKind {
    /// Signed effect of this event on the occupancy counter.
    #[must_use]
    pub const fn delta(&self) -> i64 {
        match self {
            Self::Entry => 1,
            Self::Exit => -1,
        }
    }
}

impl fmt::Display for VisitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

impl FromStr for VisitKind {
    type Err = UnknownVisitKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            _ => Err(UnknownVisitKind(s.to_string())),
        }
    }
}

impl Serialize for VisitKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VisitKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown visit kind strings.
#[derive(Debug, Clone)]
pub struct UnknownVisitKind(String);

impl fmt::Display for UnknownVisitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown visit kind: {}", self.0)
    }
}

impl std::error::Error for UnknownVisitKind {}

/// An immutable entry/exit record.
///
/// Visit events are never mutated or deleted; the occupancy counter is a
/// running sum of their deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitEvent {
    /// The occupant who scanned (or was scanned out).
    pub occupant: OccupantId,
    /// Entry or exit.
    pub kind: VisitKind,
    /// When the event was committed.
    pub timestamp: DateTime<Utc>,
    /// Session deadline, present on entry events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl VisitEvent {
    /// Creates an entry event carrying the session deadline.
    #[must_use]
    pub fn entry(occupant: OccupantId, timestamp: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            occupant,
            kind: VisitKind::Entry,
            timestamp,
            deadline: Some(deadline),
        }
    }

    /// Creates an exit event.
    #[must_use]
    pub fn exit(occupant: OccupantId, timestamp: DateTime<Utc>) -> Self {
        Self {
            occupant,
            kind: VisitKind::Exit,
            timestamp,
            deadline: None,
        }
    }
}
