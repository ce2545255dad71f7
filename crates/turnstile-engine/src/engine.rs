//! The space facade: admission control, exits, eviction, and operator
//! operations.
//!
//! Every state mutation runs under the space lock for its whole critical
//! section and commits to SQLite before the in-memory registry moves, so a
//! persistence failure leaves log, counter, registry, and profile
//! untouched. Notifications and forecaster updates are queued as effects
//! and flushed after the lock is released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use turnstile_core::clock::Clock;
use turnstile_core::forecast::{ForecastPoint, HoltWinters, ModelState, Observation};
use turnstile_core::occupant::{ExitOutcome, OccupantProfile};
use turnstile_core::rank::{rank_sessions, RankContext, ScoredSession, WeightError};
use turnstile_core::session::{RegistryError, Session, SessionRegistry};
use turnstile_core::status::{SpaceStatus, StatusRecord, WallTime};
use turnstile_core::types::{MembershipTier, OccupantId};
use turnstile_core::{VisitEvent, VisitKind};
use turnstile_db::{Database, DbError, ObservationRow};

use crate::config::EngineConfig;
use crate::hub::{CrowdState, Notification, NotificationHub, ScanAction};

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured rank weights do not sum to 1.0.
    #[error("invalid rank weights: {0}")]
    Weights(#[from] WeightError),

    /// A configuration value is outside its documented bounds.
    #[error("{what} out of range: {value} (allowed {allowed})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        allowed: &'static str,
    },

    /// The store has been failing longer than the configured threshold;
    /// scans fail fast until it recovers.
    #[error("persistence unavailable")]
    PersistenceUnavailable,

    /// A persistence operation failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A registry invariant was violated; indicates an engine bug.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The occupant entered; a session was opened.
    Admitted { session: SessionInfo },
    /// The occupant left; their session was closed.
    Exited { session: SessionInfo },
    /// The space is not open for entries.
    RejectedClosed {
        status: SpaceStatus,
        message: Option<String>,
    },
    /// The space is full and no session can be evicted.
    RejectedFullAndUnremovable,
    /// The token does not resolve to a known occupant.
    InvalidToken,
}

/// Session details returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub occupant: OccupantId,
    pub entered_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub seq: u64,
    /// Minutes until the deadline, clamped at zero.
    pub remaining_minutes: i64,
}

impl SessionInfo {
    fn new(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            occupant: session.occupant.clone(),
            entered_at: session.entered_at,
            deadline: session.deadline,
            seq: session.seq,
            remaining_minutes: session.remaining_minutes(now),
        }
    }
}

/// Consistent cross-component snapshot of the space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceSnapshot {
    pub count: u32,
    pub max: u32,
    pub percent: f64,
    pub status: SpaceStatus,
    pub message: Option<String>,
    pub crowd: CrowdState,
    pub persistence_ok: bool,
    pub last_update: DateTime<Utc>,
}

/// Forecast response for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub current: u32,
    pub max: u32,
    pub net_rate: f64,
    pub crowd: CrowdState,
    pub forecasts: Vec<ForecastPoint>,
    pub model: ModelState,
}

/// Operator occupancy adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustMode {
    /// Add to the counter.
    Increase(u32),
    /// Subtract from the counter.
    Decrease(u32),
    /// Set the counter to an absolute value.
    Set(u32),
}

/// Why a session is being closed; drives the notification topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The occupant scanned out themselves.
    ScanOut,
    /// Evicted by the admission controller or an operator.
    Evicted,
    /// Auto-closed by the sweeper at its deadline.
    Expired,
}

/// Post-commit work queued while the space lock is held and flushed after
/// it is released, preserving commit order.
enum Effect {
    Counter { count: u32, max: u32 },
    Broadcast(Notification),
    Unicast(OccupantId, Notification),
    Observe(Observation),
}

#[derive(Default)]
struct Effects {
    items: Vec<Effect>,
}

impl Effects {
    fn push(&mut self, effect: Effect) {
        self.items.push(effect);
    }
}

/// State guarded by the space lock.
struct SpaceState {
    db: Database,
    registry: SessionRegistry,
    status: StatusRecord,
    /// Recent entry/exit timestamps for the net-rate window.
    recent: VecDeque<(DateTime<Utc>, VisitKind)>,
    persistence_down_since: Option<DateTime<Utc>>,
}

impl SpaceState {
    fn note_event(&mut self, at: DateTime<Utc>, kind: VisitKind, window: Duration) {
        self.recent.push_back((at, kind));
        let cutoff = at - window;
        while matches!(self.recent.front(), Some((ts, _)) if *ts < cutoff) {
            self.recent.pop_front();
        }
    }

    /// Entries and exits per minute over the rate window ending at `now`.
    fn rates(&self, now: DateTime<Utc>, window: Duration) -> (f64, f64) {
        let cutoff = now - window;
        let minutes = window.num_minutes().max(1) as f64;
        let (mut entries, mut exits) = (0u32, 0u32);
        for (ts, kind) in &self.recent {
            if *ts < cutoff {
                continue;
            }
            match kind {
                VisitKind::Entry => entries += 1,
                VisitKind::Exit => exits += 1,
            }
        }
        (f64::from(entries) / minutes, f64::from(exits) / minutes)
    }
}

/// The occupancy control engine facade.
///
/// See the [crate documentation](crate) for the lock-ordering rules.
pub struct SpaceEngine {
    state: Mutex<SpaceState>,
    /// Counter mirror for lock-free reads; written only after a commit.
    occupancy: AtomicU32,
    max_capacity: AtomicU32,
    forecaster: Mutex<HoltWinters>,
    hub: NotificationHub,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl SpaceEngine {
    /// Builds the engine over an opened database.
    ///
    /// Validates the rank weights, rebuilds the counter from the visit
    /// log, restores open sessions into the registry, reloads the
    /// forecaster from the last 24 hours of observations, and caches the
    /// latest status record.
    pub fn new(
        mut db: Database,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.weights.validate()?;
        let now = clock.now();

        let count = db.rebuild_counter(now)?;
        let mut registry = SessionRegistry::new();
        for entry in db.open_entries()? {
            if let Err(error) = registry.open(entry.occupant.clone(), entry.entered_at, entry.deadline)
            {
                tracing::warn!(occupant = %entry.occupant, %error, "skipping duplicate open entry");
            }
        }
        tracing::info!(count, open_sessions = registry.len(), "restored space state");

        let status = db.latest_status()?.unwrap_or_else(|| StatusRecord {
            status: SpaceStatus::Open,
            message: None,
            auto_open: None,
            auto_close: None,
            auto_schedule_enabled: false,
            updated_at: now,
            updated_by: "startup".to_string(),
        });

        let snapshot = db.capacity()?;
        let mut forecaster = HoltWinters::new(config.forecast);
        let stored = db.observations_since(now - Duration::hours(24))?;
        if !stored.is_empty() {
            let history: Vec<Observation> = stored
                .iter()
                .map(|row| Observation {
                    timestamp: row.timestamp,
                    occupancy: row.occupancy,
                    net_rate: row.net_rate(),
                })
                .collect();
            let loaded = forecaster.ingest_history(&history, snapshot.max_capacity);
            tracing::debug!(loaded, "forecaster warm-started from stored observations");
        }

        Ok(Self {
            state: Mutex::new(SpaceState {
                db,
                registry,
                status,
                recent: VecDeque::new(),
                persistence_down_since: None,
            }),
            occupancy: AtomicU32::new(count),
            max_capacity: AtomicU32::new(snapshot.max_capacity),
            forecaster: Mutex::new(forecaster),
            hub: NotificationHub::new(),
            clock,
            config,
        })
    }

    /// The notification hub, for connection registration.
    #[must_use]
    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current occupancy, from the lock-free mirror.
    #[must_use]
    pub fn occupancy(&self) -> u32 {
        self.occupancy.load(Ordering::SeqCst)
    }

    // ----- scan path -----

    /// Handles a turnstile scan: entry, exit, or rejection.
    pub fn handle_scan(&self, token: &str) -> Result<ScanOutcome, EngineError> {
        let now = self.clock.now();
        let mut effects = Effects::default();
        let outcome = {
            let mut state = self.state.lock();
            self.check_persistence(&state, now)?;
            let result = self.scan_locked(&mut state, token, now, &mut effects);
            Self::track_persistence(&mut state, now, &result);
            result?
        };
        self.flush(effects);
        Ok(outcome)
    }

    fn scan_locked(
        &self,
        state: &mut SpaceState,
        token: &str,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> Result<ScanOutcome, EngineError> {
        let Ok(occupant) = OccupantId::new(token) else {
            return Ok(ScanOutcome::InvalidToken);
        };
        if state.db.get_occupant(&occupant)?.is_none() {
            tracing::debug!(%occupant, "scan with unknown token");
            return Ok(ScanOutcome::InvalidToken);
        }

        // Kind is determined inside the critical section, so AlreadyInside
        // and NotInside cannot occur on this path.
        if let Some(session) = state.registry.lookup(&occupant).cloned() {
            let info =
                self.close_session_locked(state, &session, now, now, CloseReason::ScanOut, effects)?;
            return Ok(ScanOutcome::Exited { session: info });
        }

        if !state.status.status.accepts_entries() {
            return Ok(ScanOutcome::RejectedClosed {
                status: state.status.status,
                message: state.status.message.clone(),
            });
        }

        let max = self.max_capacity.load(Ordering::SeqCst);
        let count = self.occupancy.load(Ordering::SeqCst);
        if count > max {
            // Over the cap after a capacity reduction: no evictions, entries
            // are refused until exits bring the count back down.
            return Ok(ScanOutcome::RejectedFullAndUnremovable);
        }
        if count == max {
            if state.registry.is_empty() {
                return Ok(ScanOutcome::RejectedFullAndUnremovable);
            }
            let ranked = self.rank_locked(state, now)?;
            // Nonempty by the check above; evict the top-ranked session.
            if let Some(top) = ranked.into_iter().next() {
                self.close_session_locked(
                    state,
                    &top.session,
                    now,
                    now,
                    CloseReason::Evicted,
                    effects,
                )?;
            }
            if self.occupancy.load(Ordering::SeqCst) >= max {
                // Eviction failed to free a slot; indicates a bug upstream.
                tracing::error!(max, "capacity unchanged after eviction");
                return Ok(ScanOutcome::RejectedFullAndUnremovable);
            }
        }

        self.admit_locked(state, occupant, now, effects)
    }

    fn admit_locked(
        &self,
        state: &mut SpaceState,
        occupant: OccupantId,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> Result<ScanOutcome, EngineError> {
        let mut profile = state
            .db
            .get_occupant(&occupant)?
            .unwrap_or_else(|| OccupantProfile::new(occupant.clone(), MembershipTier::Regular));

        // Monthly frequency counts this admission along with the trailing
        // 30 days of logged entries.
        let prior = state
            .db
            .entry_count_in_range(&occupant, now - Duration::days(30), now)?;
        profile.frequency_used = prior + 1;

        let deadline = now + self.config.session_length();
        let event = VisitEvent::entry(occupant.clone(), now, deadline);
        let count = state.db.append_visit(&event, Some(&profile), now)?;
        let seq = state.registry.open(occupant.clone(), now, deadline)?;
        self.occupancy.store(count, Ordering::SeqCst);
        state.note_event(now, VisitKind::Entry, self.rate_window());

        let session = Session {
            occupant: occupant.clone(),
            entered_at: now,
            deadline,
            seq,
        };
        tracing::info!(%occupant, count, %deadline, "admitted");

        effects.push(Effect::Counter {
            count,
            max: self.max_capacity.load(Ordering::SeqCst),
        });
        effects.push(Effect::Unicast(
            occupant.clone(),
            Notification::UserAction {
                occupant: occupant.clone(),
                action: ScanAction::Entered,
            },
        ));
        self.queue_observation(state, now, effects);

        Ok(ScanOutcome::Admitted {
            session: SessionInfo::new(&session, now),
        })
    }

    /// Closes a session: appends the exit event, moves the counter,
    /// updates cooperativeness, and queues notifications.
    ///
    /// This is the single exit primitive shared by voluntary scans,
    /// evictions, operator removals, and the sweeper. The database commit
    /// happens before the registry mutation, so a failed append leaves
    /// every piece of state unchanged.
    fn close_session_locked(
        &self,
        state: &mut SpaceState,
        session: &Session,
        now: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        reason: CloseReason,
        effects: &mut Effects,
    ) -> Result<SessionInfo, EngineError> {
        let mut profile = state
            .db
            .get_occupant(&session.occupant)?
            .unwrap_or_else(|| {
                OccupantProfile::new(session.occupant.clone(), MembershipTier::Regular)
            });
        let outcome = if exit_time < session.deadline {
            ExitOutcome::Voluntary
        } else {
            ExitOutcome::Forced
        };
        profile.record_exit(outcome, exit_time);

        let event = VisitEvent::exit(session.occupant.clone(), exit_time);
        let count = state.db.append_visit(&event, Some(&profile), now)?;
        let closed = state.registry.close(&session.occupant)?;
        self.occupancy.store(count, Ordering::SeqCst);
        state.note_event(exit_time, VisitKind::Exit, self.rate_window());
        tracing::info!(occupant = %session.occupant, count, ?reason, "session closed");

        effects.push(Effect::Counter {
            count,
            max: self.max_capacity.load(Ordering::SeqCst),
        });
        let occupant = session.occupant.clone();
        let notification = match reason {
            CloseReason::ScanOut => Notification::UserAction {
                occupant: occupant.clone(),
                action: ScanAction::Exited,
            },
            CloseReason::Evicted => Notification::UserRemoved {
                occupant: occupant.clone(),
                message: "your slot was released to an arriving visitor".to_string(),
            },
            CloseReason::Expired => Notification::SessionExpired {
                occupant: occupant.clone(),
                deadline: session.deadline,
            },
        };
        effects.push(Effect::Unicast(occupant, notification));
        self.queue_observation(state, now, effects);

        Ok(SessionInfo::new(&closed, exit_time))
    }

    // ----- sweeper & scheduler entry points -----

    /// Runs one auto-exit sweep; returns the number of sessions closed.
    ///
    /// Idempotent: a second sweep at the same instant finds nothing to
    /// close. Sessions are processed in ascending deadline order and exit
    /// at `min(now, deadline)`.
    pub fn sweep_once(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut effects = Effects::default();
        let swept = {
            let mut state = self.state.lock();
            let expired = state.registry.expired_as_of(now);
            let mut swept = 0usize;
            for session in expired {
                // Re-check under the same lock hold: an earlier iteration
                // cannot have closed this session, but the lookup keeps the
                // sweep safe against future refactors of the expiry list.
                if state.registry.lookup(&session.occupant).is_none() {
                    continue;
                }
                let exit_time = session.deadline.min(now);
                self.close_session_locked(
                    &mut state,
                    &session,
                    now,
                    exit_time,
                    CloseReason::Expired,
                    &mut effects,
                )?;
                swept += 1;
            }
            swept
        };
        if swept > 0 {
            tracing::info!(swept, "auto-exit sweep closed sessions");
        }
        self.flush(effects);
        Ok(swept)
    }

    /// Applies the auto open/close schedule; returns the new status if a
    /// transition happened.
    pub fn schedule_tick(&self) -> Result<Option<SpaceStatus>, EngineError> {
        let now = self.clock.now();
        let local = now + Duration::minutes(i64::from(self.config.utc_offset_minutes));
        let mut effects = Effects::default();
        let changed = {
            let mut state = self.state.lock();
            match state.status.scheduled_status(local) {
                Some(desired) if desired != state.status.status => {
                    let record = StatusRecord {
                        status: desired,
                        message: state.status.message.clone(),
                        auto_open: state.status.auto_open,
                        auto_close: state.status.auto_close,
                        auto_schedule_enabled: state.status.auto_schedule_enabled,
                        updated_at: now,
                        updated_by: "scheduler".to_string(),
                    };
                    state.db.append_status(&record)?;
                    state.status = record;
                    effects.push(Effect::Broadcast(Notification::StatusUpdate {
                        status: desired,
                        message: state.status.message.clone(),
                    }));
                    tracing::info!(status = %desired, "schedule applied");
                    Some(desired)
                }
                _ => None,
            }
        };
        self.flush(effects);
        Ok(changed)
    }

    // ----- operator surface -----

    /// Consistent snapshot of count, capacity, status, and health.
    pub fn get_state(&self) -> Result<SpaceSnapshot, EngineError> {
        let state = self.state.lock();
        let snapshot = state.db.capacity()?;
        let count = snapshot.current_occupancy;
        let max = snapshot.max_capacity;
        Ok(SpaceSnapshot {
            count,
            max,
            percent: if max == 0 {
                100.0
            } else {
                f64::from(count) / f64::from(max) * 100.0
            },
            status: state.status.status,
            message: state.status.message.clone(),
            crowd: CrowdState::classify(count, max),
            persistence_ok: state.persistence_down_since.is_none(),
            last_update: snapshot.updated_at,
        })
    }

    /// Session info for one occupant, if they are inside.
    #[must_use]
    pub fn get_session(&self, occupant: &OccupantId) -> Option<SessionInfo> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .registry
            .lookup(occupant)
            .map(|session| SessionInfo::new(session, now))
    }

    /// Changes the maximum capacity (1..=10000).
    ///
    /// Reducing the cap below the current occupancy never evicts anyone
    /// and never truncates the counter; entries are refused until exits
    /// bring the count back under the cap.
    pub fn set_max_capacity(&self, max: u32) -> Result<SpaceSnapshot, EngineError> {
        if !(1..=10_000).contains(&max) {
            return Err(EngineError::OutOfRange {
                what: "max capacity",
                value: i64::from(max),
                allowed: "1..=10000",
            });
        }
        let now = self.clock.now();
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            let previous = self.max_capacity.load(Ordering::SeqCst);
            state.db.set_max_capacity(max, now)?;
            if max < previous {
                // A reduction re-derives the counter from the log so later
                // admissions compare against the authoritative value.
                let count = state.db.rebuild_counter(now)?;
                self.occupancy.store(count, Ordering::SeqCst);
            }
            self.max_capacity.store(max, Ordering::SeqCst);
            effects.push(Effect::Counter {
                count: self.occupancy.load(Ordering::SeqCst),
                max,
            });
            tracing::info!(previous, max, "max capacity changed");
        }
        self.flush(effects);
        self.get_state()
    }

    /// Operator drift correction of the occupancy counter.
    ///
    /// Moves the counter and capacity row only; the visit log and session
    /// registry are untouched, and `rebuild_counter` restores the
    /// log-derived value at the next startup.
    pub fn adjust_occupancy(&self, mode: AdjustMode) -> Result<SpaceSnapshot, EngineError> {
        let now = self.clock.now();
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            let max = self.max_capacity.load(Ordering::SeqCst);
            let current = i64::from(self.occupancy.load(Ordering::SeqCst));
            let target = match mode {
                AdjustMode::Increase(n) => current + i64::from(n),
                AdjustMode::Decrease(n) => current - i64::from(n),
                AdjustMode::Set(n) => i64::from(n),
            };
            if target < 0 || target > i64::from(max) {
                return Err(EngineError::OutOfRange {
                    what: "occupancy",
                    value: target,
                    allowed: "0..=max",
                });
            }
            let target = u32::try_from(target).unwrap_or(0);
            state.db.set_current_occupancy(target, now)?;
            self.occupancy.store(target, Ordering::SeqCst);
            tracing::warn!(from = current, to = target, "occupancy adjusted by operator");
            effects.push(Effect::Counter { count: target, max });
            self.queue_observation(&mut state, now, &mut effects);
        }
        self.flush(effects);
        self.get_state()
    }

    /// Writes a new status record and broadcasts the change.
    pub fn set_status(
        &self,
        status: SpaceStatus,
        message: Option<String>,
        auto_open: Option<WallTime>,
        auto_close: Option<WallTime>,
        auto_schedule_enabled: bool,
        updated_by: &str,
    ) -> Result<StatusRecord, EngineError> {
        let now = self.clock.now();
        let record = StatusRecord {
            status,
            message,
            auto_open,
            auto_close,
            auto_schedule_enabled,
            updated_at: now,
            updated_by: updated_by.to_string(),
        };
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            state.db.append_status(&record)?;
            state.status = record.clone();
            effects.push(Effect::Broadcast(Notification::StatusUpdate {
                status,
                message: record.message.clone(),
            }));
        }
        tracing::info!(status = %status, updated_by, "status changed");
        self.flush(effects);
        Ok(record)
    }

    /// All open sessions scored and ordered by removal priority.
    pub fn list_scored(&self) -> Result<Vec<ScoredSession>, EngineError> {
        let now = self.clock.now();
        let state = self.state.lock();
        self.rank_locked(&state, now)
    }

    /// Evicts the top `n` ranked sessions (capped at the registry size).
    ///
    /// Each eviction goes through the shared exit primitive and notifies
    /// the removed occupant.
    pub fn force_remove_top(&self, n: usize) -> Result<Vec<SessionInfo>, EngineError> {
        if n == 0 {
            return Err(EngineError::OutOfRange {
                what: "removal count",
                value: 0,
                allowed: "1..",
            });
        }
        let now = self.clock.now();
        let mut effects = Effects::default();
        let removed = {
            let mut state = self.state.lock();
            let ranked = self.rank_locked(&state, now)?;
            let mut removed = Vec::new();
            for scored in ranked.into_iter().take(n) {
                let info = self.close_session_locked(
                    &mut state,
                    &scored.session,
                    now,
                    now,
                    CloseReason::Evicted,
                    &mut effects,
                )?;
                removed.push(info);
            }
            removed
        };
        self.flush(effects);
        Ok(removed)
    }

    /// k-minute occupancy forecast (k in 10..=60).
    pub fn forecast(&self, horizon: u32) -> Result<ForecastReport, EngineError> {
        if !(10..=60).contains(&horizon) {
            return Err(EngineError::OutOfRange {
                what: "forecast horizon",
                value: i64::from(horizon),
                allowed: "10..=60",
            });
        }
        let now = self.clock.now();
        let count = self.occupancy.load(Ordering::SeqCst);
        let max = self.max_capacity.load(Ordering::SeqCst);
        let forecaster = self.forecaster.lock();
        Ok(ForecastReport {
            current: count,
            max,
            net_rate: forecaster.last_net_rate(),
            crowd: CrowdState::classify(count, max),
            forecasts: forecaster.forecast(now, horizon, max),
            model: forecaster.state(),
        })
    }

    /// Loads a batch of historical observations into the store and the
    /// model. Returns the number of rows loaded.
    pub fn ingest_history(&self, rows: &[ObservationRow]) -> Result<usize, EngineError> {
        {
            let mut state = self.state.lock();
            for row in rows {
                state.db.insert_observation(row)?;
            }
        }
        let max = self.max_capacity.load(Ordering::SeqCst);
        let history: Vec<Observation> = rows
            .iter()
            .map(|row| Observation {
                timestamp: row.timestamp,
                occupancy: row.occupancy,
                net_rate: row.net_rate(),
            })
            .collect();
        let loaded = self.forecaster.lock().ingest_history(&history, max);
        Ok(loaded)
    }

    // ----- internals -----

    fn rank_locked(
        &self,
        state: &SpaceState,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredSession>, EngineError> {
        let sessions = state.registry.list();
        let mut candidates = Vec::with_capacity(sessions.len());
        for session in sessions {
            let profile = state.db.get_occupant(&session.occupant)?.unwrap_or_else(|| {
                OccupantProfile::new(session.occupant.clone(), MembershipTier::Regular)
            });
            candidates.push((session, profile));
        }
        let local = now + Duration::minutes(i64::from(self.config.utc_offset_minutes));
        let ctx = RankContext {
            now,
            local_hour: local.hour(),
            total_inside: candidates.len(),
            weights: &self.config.weights,
            tuning: &self.config.tuning,
        };
        Ok(rank_sessions(&candidates, &ctx))
    }

    fn rate_window(&self) -> Duration {
        Duration::minutes(self.config.rate_window_minutes.max(1))
    }

    /// Persists an observation row and queues the in-memory model update.
    ///
    /// Observation persistence is auxiliary: a failure is logged and never
    /// propagated to the operation that produced it.
    fn queue_observation(&self, state: &mut SpaceState, now: DateTime<Utc>, effects: &mut Effects) {
        let window = self.rate_window();
        let (entry_rate, exit_rate) = state.rates(now, window);
        let occupancy = f64::from(self.occupancy.load(Ordering::SeqCst));
        let row = ObservationRow {
            timestamp: now,
            occupancy,
            entry_rate,
            exit_rate,
        };
        if let Err(error) = state.db.insert_observation(&row) {
            tracing::warn!(%error, "failed to persist observation");
        }
        effects.push(Effect::Observe(Observation {
            timestamp: now,
            occupancy,
            net_rate: entry_rate - exit_rate,
        }));
    }

    fn check_persistence(&self, state: &SpaceState, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some(since) = state.persistence_down_since {
            if now - since >= Duration::seconds(self.config.persistence_fail_after_secs) {
                return Err(EngineError::PersistenceUnavailable);
            }
        }
        Ok(())
    }

    fn track_persistence<T>(
        state: &mut SpaceState,
        now: DateTime<Utc>,
        result: &Result<T, EngineError>,
    ) {
        match result {
            Ok(_) => state.persistence_down_since = None,
            Err(EngineError::Db(error)) => {
                tracing::error!(%error, "persistence failure during scan");
                state.persistence_down_since.get_or_insert(now);
            }
            Err(_) => {}
        }
    }

    /// Flushes queued effects with no lock held (hub and forecaster each
    /// take their own lock internally).
    fn flush(&self, effects: Effects) {
        for effect in effects.items {
            match effect {
                Effect::Counter { count, max } => self.hub.occupancy_changed(count, max),
                Effect::Broadcast(notification) => self.hub.broadcast(&notification),
                Effect::Unicast(occupant, notification) => {
                    self.hub.unicast(&occupant, &notification);
                }
                Effect::Observe(observation) => {
                    let max = self.max_capacity.load(Ordering::SeqCst);
                    self.forecaster.lock().observe(observation, max);
                }
            }
        }
    }
}
