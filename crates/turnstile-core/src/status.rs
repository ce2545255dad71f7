//! Space status and the auto-open/auto-close schedule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status input errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatusError {
    /// Unknown status string.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// A wall time was not in HH:MM form.
    #[error("invalid time format (expected HH:MM): {0}")]
    InvalidTimeFormat(String),
}

/// Operational status of the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpaceStatus {
    /// Accepting entries.
    #[default]
    Open,
    /// Closed; entries rejected, exits still processed.
    Closed,
    /// Closed for maintenance; never overridden by the schedule.
    Maintenance,
}

impl SpaceStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Maintenance => "maintenance",
        }
    }

    /// Whether entry scans are accepted in this status.
    #[must_use]
    pub const fn accepts_entries(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpaceStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(StatusError::InvalidStatus(s.to_string())),
        }
    }
}

impl Serialize for SpaceStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpaceStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A wall-clock time of day in HH:MM form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime {
    hour: u32,
    minute: u32,
}

impl WallTime {
    /// Parses an `HH:MM` string with 24-hour hours.
    pub fn parse(s: &str) -> Result<Self, StatusError> {
        let invalid = || StatusError::InvalidTimeFormat(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }

    /// Hour component (0..24).
    #[must_use]
    pub const fn hour(&self) -> u32 {
        self.hour
    }

    /// Minute component (0..60).
    #[must_use]
    pub const fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for WallTime {
    type Error = StatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> Self {
        t.to_string()
    }
}

impl FromStr for WallTime {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A status change plus its schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusRecord {
    /// The status in effect.
    pub status: SpaceStatus,
    /// Operator message shown with rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Weekday auto-open time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_open: Option<WallTime>,
    /// Weekday auto-close time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_close: Option<WallTime>,
    /// Whether the scheduler applies the auto times.
    #[serde(default)]
    pub auto_schedule_enabled: bool,
    /// When this record was written.
    pub updated_at: DateTime<Utc>,
    /// Who wrote it ("scheduler" for automatic transitions).
    pub updated_by: String,
}

impl StatusRecord {
    /// The status the schedule calls for at `now`, if any.
    ///
    /// Returns `None` when the schedule is disabled, incomplete, `now`
    /// falls on a weekend, or the current status is Maintenance (which is
    /// sticky until an operator clears it).
    #[must_use]
    pub fn scheduled_status(&self, now: DateTime<Utc>) -> Option<SpaceStatus> {
        if !self.auto_schedule_enabled || self.status == SpaceStatus::Maintenance {
            return None;
        }
        let (open, close) = (self.auto_open?, self.auto_close?);
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return None;
        }
        let tod = now.time();
        let desired = if open.as_naive() <= tod && tod < close.as_naive() {
            SpaceStatus::Open
        } else {
            SpaceStatus::Closed
        };
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(status: SpaceStatus, enabled: bool) -> StatusRecord {
        StatusRecord {
            status,
            message: None,
            auto_open: Some(WallTime::parse("09:00").unwrap()),
            auto_close: Some(WallTime::parse("18:00").unwrap()),
            auto_schedule_enabled: enabled,
            updated_at: Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap(),
            updated_by: "test".to_string(),
        }
    }

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            SpaceStatus::Open,
            SpaceStatus::Closed,
            SpaceStatus::Maintenance,
        ] {
            let parsed: SpaceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(
            "half-open".parse::<SpaceStatus>(),
            Err(StatusError::InvalidStatus("half-open".to_string()))
        );
    }

    #[test]
    fn wall_time_parses_strictly() {
        assert_eq!(WallTime::parse("09:30").unwrap().to_string(), "09:30");
        assert_eq!(WallTime::parse("00:00").unwrap().hour(), 0);
        assert_eq!(WallTime::parse("23:59").unwrap().minute(), 59);

        for bad in ["24:00", "12:60", "9:30", "09:3", "0930", "ab:cd", ""] {
            assert!(WallTime::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn schedule_opens_on_weekday_mornings() {
        // 2025-03-03 is a Monday.
        let rec = record(SpaceStatus::Closed, true);
        let morning = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        assert_eq!(rec.scheduled_status(morning), Some(SpaceStatus::Open));

        let night = Utc.with_ymd_and_hms(2025, 3, 3, 22, 0, 0).unwrap();
        assert_eq!(rec.scheduled_status(night), Some(SpaceStatus::Closed));
    }

    #[test]
    fn schedule_skips_weekends() {
        let rec = record(SpaceStatus::Closed, true);
        // 2025-03-01 is a Saturday.
        let saturday = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(rec.scheduled_status(saturday), None);
    }

    #[test]
    fn schedule_respects_disable_and_maintenance() {
        let monday = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        assert_eq!(record(SpaceStatus::Closed, false).scheduled_status(monday), None);
        assert_eq!(
            record(SpaceStatus::Maintenance, true).scheduled_status(monday),
            None
        );
    }

    #[test]
    fn boundary_minutes_are_inclusive_open_exclusive_close() {
        let rec = record(SpaceStatus::Closed, true);
        let at_open = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        assert_eq!(rec.scheduled_status(at_open), Some(SpaceStatus::Open));
        let at_close = Utc.with_ymd_and_hms(2025, 3, 3, 18, 0, 0).unwrap();
        assert_eq!(rec.scheduled_status(at_close), Some(SpaceStatus::Closed));
    }
}
