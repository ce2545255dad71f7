//! The concurrent occupancy control engine.
//!
//! [`SpaceEngine`] is the single-writer facade over the shared space: it
//! admits and exits occupants, enforces the capacity cap, evicts the
//! lowest-value session when the space is full, forecasts near-term
//! occupancy, and fans out notifications.
//!
//! # Lock ordering
//!
//! Three locks exist and are never held together:
//! 1. The space lock (registry + database + cached status) covers every
//!    state mutation for its whole critical section.
//! 2. The forecaster lock is taken only after the space lock is released.
//! 3. The hub lock is held only while copying the connection list;
//!    notification sends happen with no lock held.

pub mod config;
pub mod engine;
pub mod hub;
pub mod scheduler;
pub mod sweeper;
pub mod worker;

pub use config::EngineConfig;
pub use engine::{
    AdjustMode, EngineError, ForecastReport, ScanOutcome, SessionInfo, SpaceEngine, SpaceSnapshot,
};
pub use hub::{ConnectionId, CrowdState, Notification, NotificationHub, NotificationSink};
pub use scheduler::StatusScheduler;
pub use sweeper::Sweeper;
pub use worker::WorkerHandle;
