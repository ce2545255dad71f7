//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A score value was out of range.
    #[error("score must be between 0.0 and 1.0, got {value}")]
    ScoreOutOfRange { value: f64 },

    /// Invalid membership tier value.
    #[error("invalid membership tier: {value}")]
    InvalidTier { value: String },
}

/// Membership class of an occupant.
///
/// Privileged members are exempt from the removal ranker's privilege axis
/// (their P factor is zero), making them the last to be evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    /// Privileged membership (staff, faculty, premium).
    Privileged,
    /// Regular membership.
    #[default]
    Regular,
}

impl MembershipTier {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Privileged => "privileged",
            Self::Regular => "regular",
        }
    }

    /// Whether this tier is exempt from removal scoring on the privilege axis.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self, Self::Privileged)
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MembershipTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "privileged" => Ok(Self::Privileged),
            "regular" => Ok(Self::Regular),
            _ => Err(ValidationError::InvalidTier {
                value: s.to_string(),
            }),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated occupant identifier.
    ///
    /// Occupant IDs are the opaque scan tokens presented at the turnstile.
    /// They must be non-empty; uniqueness is enforced at the database level.
    OccupantId, "occupant ID"
);

/// A score in the range \[0.0, 1.0\].
///
/// Used for removal scores and cooperativeness history. Values are clamped
/// rather than rejected when produced by arithmetic (EMA updates, weighted
/// sums) so intermediate rounding can never push a score out of range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    /// The maximum score value (1.0).
    pub const MAX: Self = Self(1.0);

    /// The minimum score value (0.0).
    pub const MIN: Self = Self(0.0);

    /// Creates a new score after validation.
    ///
    /// Returns an error if the value is outside \[0.0, 1.0\] or is NaN.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::ScoreOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Creates a score, clamping to \[0.0, 1.0\]. NaN values become 0.0.
    #[must_use]
    pub const fn clamped(value: f64) -> Self {
        if value.is_nan() || value < 0.0 {
            Self(0.0)
        } else if value > 1.0 {
            Self(1.0)
        } else {
            Self(value)
        }
    }

    /// Returns the inner f64 value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupant_id_rejects_empty() {
        assert!(OccupantId::new("").is_err());
        assert!(OccupantId::new("alice").is_ok());
    }

    #[test]
    fn occupant_id_serde_roundtrip() {
        let id = OccupantId::new("token-42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"token-42\"");
        let parsed: OccupantId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn occupant_id_rejects_empty_from_serde() {
        let result: Result<OccupantId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn score_validates_range() {
        assert!(Score::new(0.0).is_ok());
        assert!(Score::new(1.0).is_ok());
        assert!(Score::new(-0.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f64::NAN).is_err());
    }

    #[test]
    fn score_clamps() {
        assert_eq!(Score::clamped(-5.0).value(), 0.0);
        assert_eq!(Score::clamped(5.0).value(), 1.0);
        assert_eq!(Score::clamped(0.5).value(), 0.5);
        assert_eq!(Score::clamped(f64::NAN).value(), 0.0);
    }

    #[test]
    fn tier_roundtrips_through_strings() {
        for tier in [MembershipTier::Privileged, MembershipTier::Regular] {
            let parsed: MembershipTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("gold".parse::<MembershipTier>().is_err());
    }
}
