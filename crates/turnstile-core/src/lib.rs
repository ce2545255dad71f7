//! Core domain logic for the turnstile occupancy engine.
//!
//! This crate contains the pure, I/O-free building blocks:
//! - Visit events and the entry/exit bookkeeping they imply
//! - The in-memory session registry of who is currently inside
//! - The removal-score ranker used when the space is full
//! - The Holt-Winters occupancy forecaster
//! - Space status and auto-open/auto-close schedule math
//! - A clock abstraction so every time-sensitive path is testable

pub mod clock;
pub mod event;
pub mod forecast;
pub mod occupant;
pub mod rank;
pub mod session;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{VisitEvent, VisitKind};
pub use forecast::{ForecastConfig, ForecastPoint, HoltWinters, ModelState, Observation};
pub use occupant::{ExitOutcome, OccupantProfile, DEFAULT_COOPERATIVENESS};
pub use rank::{
    rank_sessions, score_session, FactorBreakdown, RankContext, RankTuning, RankWeights,
    ScoredSession, WeightError,
};
pub use session::{RegistryError, Session, SessionRegistry};
pub use status::{SpaceStatus, StatusError, StatusRecord, WallTime};
pub use types::{MembershipTier, OccupantId, Score, ValidationError};
