//! Storage layer for the turnstile occupancy engine.
//!
//! Provides persistence for the visit log, the capacity singleton, status
//! history, occupant profiles, and forecaster observations using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but
//! not `Sync`. The engine serializes access by holding the database inside
//! its space-wide mutex; the critical-section work is a handful of local
//! statements, so the lock hold time stays short.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format (e.g.,
//! `2024-01-15T10:30:00.000Z`). This format is used by
//! `chrono::DateTime<Utc>` serialization and ensures:
//! - Lexicographic ordering matches chronological ordering
//! - Human-readable values in the database
//! - Timezone-aware (always UTC)
//!
//! ## Visit log
//!
//! `visit_events` is append-only: rows are never updated or deleted, and
//! the `capacity` singleton's `current_occupancy` is moved in the same
//! transaction as every append. `rebuild_counter` re-derives the counter
//! from the log (entries minus exits, clamped at zero), which makes the log
//! the single source of truth after restarts or manual adjustments.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use turnstile_core::occupant::OccupantProfile;
use turnstile_core::status::{SpaceStatus, StatusRecord, WallTime};
use turnstile_core::types::{MembershipTier, OccupantId, Score};
use turnstile_core::{VisitEvent, VisitKind};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {table}: {value}")]
    TimestampParse {
        table: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A stored enum or id column failed validation.
    #[error("invalid {column} value in {table}: {message}")]
    InvalidColumn {
        table: &'static str,
        column: &'static str,
        message: String,
    },

    /// The capacity singleton row is missing.
    ///
    /// `Database::open` seeds the row, so this indicates external
    /// tampering with the store.
    #[error("capacity configuration row is missing")]
    CapacityRowMissing,
}

/// Snapshot of the capacity singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    /// Hard cap on simultaneous occupants.
    pub max_capacity: u32,
    /// Current occupancy counter.
    pub current_occupancy: u32,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

/// A visit event with its stable log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVisit {
    /// Append-order row id.
    pub rowid: i64,
    /// The event payload.
    pub event: VisitEvent,
}

/// A stored forecaster observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRow {
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,
    /// Occupancy at that time.
    pub occupancy: f64,
    /// Entries per minute over the sampling window.
    pub entry_rate: f64,
    /// Exits per minute over the sampling window.
    pub exit_rate: f64,
}

impl ObservationRow {
    /// Net rate (entries minus exits per minute).
    #[must_use]
    pub fn net_rate(&self) -> f64 {
        self.entry_rate - self.exit_rate
    }
}

/// An occupant together with the entry data needed to restore a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEntry {
    /// The occupant whose latest event is an entry.
    pub occupant: OccupantId,
    /// Entry timestamp.
    pub entered_at: DateTime<Utc>,
    /// Session deadline recorded with the entry.
    pub deadline: DateTime<Utc>,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized and the capacity singleton is seeded with
    /// `default_max` on first open.
    pub fn open(path: &Path, default_max: u32, now: DateTime<Utc>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init(default_max, now)?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection
    /// closes.
    pub fn open_in_memory(default_max: u32, now: DateTime<Utc>) -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init(default_max, now)?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self, default_max: u32, now: DateTime<Utc>) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Visit log: append-only entry/exit records
            -- timestamp/deadline: ISO 8601 text, UTC
            CREATE TABLE IF NOT EXISTS visit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                occupant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                deadline TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_visit_events_timestamp ON visit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_visit_events_occupant ON visit_events(occupant_id);
            CREATE INDEX IF NOT EXISTS idx_visit_events_kind ON visit_events(kind);

            -- Capacity singleton: exactly one row, id = 1
            CREATE TABLE IF NOT EXISTS capacity (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                max_capacity INTEGER NOT NULL,
                current_occupancy INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Status history: append-only status transitions
            CREATE TABLE IF NOT EXISTS status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                message TEXT,
                auto_open TEXT,
                auto_close TEXT,
                auto_schedule_enabled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );

            -- Occupant profile subset owned by the core
            CREATE TABLE IF NOT EXISTS occupants (
                id TEXT PRIMARY KEY,
                tier TEXT NOT NULL DEFAULT 'regular',
                age INTEGER,
                demographic TEXT,
                cooperativeness REAL NOT NULL DEFAULT 0.5,
                frequency_used INTEGER NOT NULL DEFAULT 0,
                last_visit TEXT
            );

            -- Forecaster observations, minute granularity
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                occupancy REAL NOT NULL,
                entry_rate REAL NOT NULL,
                exit_rate REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_observations_timestamp ON observations(timestamp);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO capacity (id, max_capacity, current_occupancy, updated_at)
             VALUES (1, ?, 0, ?)",
            params![default_max, format_timestamp(now)],
        )?;
        Ok(())
    }

    // ----- visit log & counter -----

    /// Appends a visit event and moves the occupancy counter in the same
    /// transaction.
    ///
    /// Entry adds one; exit subtracts one, clamped at zero. When
    /// `profile` is given, the occupant row is updated in the same
    /// transaction so a failed append leaves cooperativeness and
    /// last-visit untouched. Returns the counter after the append.
    pub fn append_visit(
        &mut self,
        event: &VisitEvent,
        profile: Option<&OccupantProfile>,
        now: DateTime<Utc>,
    ) -> Result<u32, DbError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO visit_events (occupant_id, kind, timestamp, deadline)
             VALUES (?, ?, ?, ?)",
            params![
                event.occupant.as_str(),
                event.kind.to_string(),
                format_timestamp(event.timestamp),
                event.deadline.map(format_timestamp),
            ],
        )?;

        let current: i64 =
            tx.query_row("SELECT current_occupancy FROM capacity WHERE id = 1", [], |row| {
                row.get(0)
            })?;
        let next = (current + event.kind.delta()).max(0);
        tx.execute(
            "UPDATE capacity SET current_occupancy = ?, updated_at = ? WHERE id = 1",
            params![next, format_timestamp(now)],
        )?;

        if let Some(profile) = profile {
            upsert_occupant_tx(&tx, profile)?;
        }

        tx.commit()?;
        Ok(u32::try_from(next).unwrap_or(0))
    }

    /// Returns the capacity singleton.
    pub fn capacity(&self) -> Result<CapacitySnapshot, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT max_capacity, current_occupancy, updated_at FROM capacity WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(DbError::CapacityRowMissing)?;

        Ok(CapacitySnapshot {
            max_capacity: u32::try_from(row.0).unwrap_or(0),
            current_occupancy: u32::try_from(row.1).unwrap_or(0),
            updated_at: parse_timestamp("capacity", &row.2)?,
        })
    }

    /// Sets the maximum capacity without touching the counter.
    pub fn set_max_capacity(&mut self, max: u32, now: DateTime<Utc>) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE capacity SET max_capacity = ?, updated_at = ? WHERE id = 1",
            params![max, format_timestamp(now)],
        )?;
        Ok(())
    }

    /// Overwrites the occupancy counter (operator drift correction).
    ///
    /// The visit log is untouched, so `rebuild_counter` will re-derive the
    /// log-authoritative value on the next startup.
    pub fn set_current_occupancy(&mut self, count: u32, now: DateTime<Utc>) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE capacity SET current_occupancy = ?, updated_at = ? WHERE id = 1",
            params![count, format_timestamp(now)],
        )?;
        Ok(())
    }

    /// Recomputes the counter as entries minus exits over the whole log,
    /// clamped at zero, and persists it. Returns the rebuilt value.
    ///
    /// Run on startup and after capacity reductions.
    pub fn rebuild_counter(&mut self, now: DateTime<Utc>) -> Result<u32, DbError> {
        let tx = self.conn.transaction()?;
        let entries: i64 = tx.query_row(
            "SELECT COUNT(*) FROM visit_events WHERE kind = 'entry'",
            [],
            |row| row.get(0),
        )?;
        let exits: i64 = tx.query_row(
            "SELECT COUNT(*) FROM visit_events WHERE kind = 'exit'",
            [],
            |row| row.get(0),
        )?;
        let count = (entries - exits).max(0);
        tx.execute(
            "UPDATE capacity SET current_occupancy = ?, updated_at = ? WHERE id = 1",
            params![count, format_timestamp(now)],
        )?;
        tx.commit()?;
        Ok(u32::try_from(count).unwrap_or(0))
    }

    /// Lists the whole visit log in append order.
    pub fn list_visits(&self) -> Result<Vec<StoredVisit>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occupant_id, kind, timestamp, deadline
             FROM visit_events
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], visit_from_row)?;
        let mut visits = Vec::new();
        for row in rows {
            visits.push(row??);
        }
        Ok(visits)
    }

    /// Lists visit events for one occupant in append order.
    pub fn visits_for_occupant(&self, occupant: &OccupantId) -> Result<Vec<StoredVisit>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occupant_id, kind, timestamp, deadline
             FROM visit_events
             WHERE occupant_id = ?
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([occupant.as_str()], visit_from_row)?;
        let mut visits = Vec::new();
        for row in rows {
            visits.push(row??);
        }
        Ok(visits)
    }

    /// Counts entry events for an occupant in `[since, until)`.
    ///
    /// Used to recompute the monthly visit frequency on admission.
    pub fn entry_count_in_range(
        &self,
        occupant: &OccupantId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visit_events
             WHERE occupant_id = ? AND kind = 'entry' AND timestamp >= ? AND timestamp < ?",
            params![
                occupant.as_str(),
                format_timestamp(since),
                format_timestamp(until)
            ],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(0))
    }

    /// Occupants whose latest logged event is an entry, with its data.
    ///
    /// Used at startup to restore the in-memory session registry. An entry
    /// without a stored deadline is given `entered_at` back (immediately
    /// expirable) rather than dropped, so the counter and registry stay
    /// coherent.
    pub fn open_entries(&self) -> Result<Vec<OpenEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.occupant_id, e.timestamp, e.deadline
             FROM visit_events e
             JOIN (
                 SELECT occupant_id, MAX(id) AS last_id
                 FROM visit_events
                 GROUP BY occupant_id
             ) latest ON e.id = latest.last_id
             WHERE e.kind = 'entry'
             ORDER BY e.id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (occupant, timestamp, deadline) = row?;
            let occupant = parse_occupant_id("visit_events", &occupant)?;
            let entered_at = parse_timestamp("visit_events", &timestamp)?;
            let deadline = match deadline {
                Some(raw) => parse_timestamp("visit_events", &raw)?,
                None => entered_at,
            };
            entries.push(OpenEntry {
                occupant,
                entered_at,
                deadline,
            });
        }
        Ok(entries)
    }

    // ----- status history -----

    /// Appends a status record.
    pub fn append_status(&mut self, record: &StatusRecord) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO status_history
             (status, message, auto_open, auto_close, auto_schedule_enabled, updated_at, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.status.as_str(),
                record.message,
                record.auto_open.map(|t| t.to_string()),
                record.auto_close.map(|t| t.to_string()),
                record.auto_schedule_enabled,
                format_timestamp(record.updated_at),
                record.updated_by,
            ],
        )?;
        Ok(())
    }

    /// Returns the most recent status record, if any.
    pub fn latest_status(&self) -> Result<Option<StatusRecord>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT status, message, auto_open, auto_close, auto_schedule_enabled,
                        updated_at, updated_by
                 FROM status_history
                 ORDER BY id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, message, auto_open, auto_close, enabled, updated_at, updated_by)) = row
        else {
            return Ok(None);
        };

        let status: SpaceStatus = status.parse().map_err(|_| DbError::InvalidColumn {
            table: "status_history",
            column: "status",
            message: status.clone(),
        })?;
        let auto_open = auto_open.map(|raw| parse_wall_time(&raw)).transpose()?;
        let auto_close = auto_close.map(|raw| parse_wall_time(&raw)).transpose()?;

        Ok(Some(StatusRecord {
            status,
            message,
            auto_open,
            auto_close,
            auto_schedule_enabled: enabled,
            updated_at: parse_timestamp("status_history", &updated_at)?,
            updated_by,
        }))
    }

    // ----- occupant profiles -----

    /// Inserts or replaces an occupant profile.
    pub fn upsert_occupant(&mut self, profile: &OccupantProfile) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        upsert_occupant_tx(&tx, profile)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches an occupant profile by id.
    pub fn get_occupant(&self, id: &OccupantId) -> Result<Option<OccupantProfile>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, tier, age, demographic, cooperativeness, frequency_used, last_visit
                 FROM occupants
                 WHERE id = ?",
                [id.as_str()],
                occupant_columns,
            )
            .optional()?;
        row.map(occupant_from_columns).transpose()
    }

    /// Lists all occupant profiles ordered by id.
    pub fn list_occupants(&self) -> Result<Vec<OccupantProfile>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tier, age, demographic, cooperativeness, frequency_used, last_visit
             FROM occupants
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], occupant_columns)?;
        let mut occupants = Vec::new();
        for row in rows {
            occupants.push(occupant_from_columns(row?)?);
        }
        Ok(occupants)
    }

    // ----- forecaster observations -----

    /// Appends a forecaster observation.
    pub fn insert_observation(&mut self, obs: &ObservationRow) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO observations (timestamp, occupancy, entry_rate, exit_rate)
             VALUES (?, ?, ?, ?)",
            params![
                format_timestamp(obs.timestamp),
                obs.occupancy,
                obs.entry_rate,
                obs.exit_rate,
            ],
        )?;
        Ok(())
    }

    /// Observations at or after `since`, ascending by time.
    pub fn observations_since(&self, since: DateTime<Utc>) -> Result<Vec<ObservationRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, occupancy, entry_rate, exit_rate
             FROM observations
             WHERE timestamp >= ?
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map([format_timestamp(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut observations = Vec::new();
        for row in rows {
            let (timestamp, occupancy, entry_rate, exit_rate) = row?;
            observations.push(ObservationRow {
                timestamp: parse_timestamp("observations", &timestamp)?,
                occupancy,
                entry_rate,
                exit_rate,
            });
        }
        Ok(observations)
    }

    /// Deletes observations older than `before`. Returns rows removed.
    pub fn prune_observations(&mut self, before: DateTime<Utc>) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM observations WHERE timestamp < ?",
            [format_timestamp(before)],
        )?;
        Ok(removed)
    }
}

type OccupantColumns = (
    String,
    String,
    Option<i64>,
    Option<String>,
    f64,
    i64,
    Option<String>,
);

fn occupant_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<OccupantColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn occupant_from_columns(columns: OccupantColumns) -> Result<OccupantProfile, DbError> {
    let (id, tier, age, demographic, cooperativeness, frequency_used, last_visit) = columns;
    let id = parse_occupant_id("occupants", &id)?;
    let tier: MembershipTier = tier.parse().map_err(|_| DbError::InvalidColumn {
        table: "occupants",
        column: "tier",
        message: tier.clone(),
    })?;
    let last_visit = last_visit
        .map(|raw| parse_timestamp("occupants", &raw))
        .transpose()?;
    Ok(OccupantProfile {
        id,
        tier,
        age: age.and_then(|a| u32::try_from(a).ok()),
        demographic,
        cooperativeness: Score::clamped(cooperativeness),
        frequency_used: u32::try_from(frequency_used).unwrap_or(0),
        last_visit,
    })
}

fn upsert_occupant_tx(
    tx: &rusqlite::Transaction<'_>,
    profile: &OccupantProfile,
) -> Result<(), DbError> {
    tx.execute(
        "INSERT INTO occupants
         (id, tier, age, demographic, cooperativeness, frequency_used, last_visit)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             tier = excluded.tier,
             age = excluded.age,
             demographic = excluded.demographic,
             cooperativeness = excluded.cooperativeness,
             frequency_used = excluded.frequency_used,
             last_visit = excluded.last_visit",
        params![
            profile.id.as_str(),
            profile.tier.as_str(),
            profile.age.map(i64::from),
            profile.demographic,
            profile.cooperativeness.value(),
            i64::from(profile.frequency_used),
            profile.last_visit.map(format_timestamp),
        ],
    )?;
    Ok(())
}

fn visit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<StoredVisit, DbError>> {
    let rowid: i64 = row.get(0)?;
    let occupant: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let timestamp: String = row.get(3)?;
    let deadline: Option<String> = row.get(4)?;
    Ok(build_stored_visit(rowid, occupant, kind, timestamp, deadline))
}

fn build_stored_visit(
    rowid: i64,
    occupant: String,
    kind: String,
    timestamp: String,
    deadline: Option<String>,
) -> Result<StoredVisit, DbError> {
    let occupant = parse_occupant_id("visit_events", &occupant)?;
    let kind: VisitKind = kind.parse().map_err(|_| DbError::InvalidColumn {
        table: "visit_events",
        column: "kind",
        message: kind.clone(),
    })?;
    let timestamp = parse_timestamp("visit_events", &timestamp)?;
    let deadline = deadline
        .map(|raw| parse_timestamp("visit_events", &raw))
        .transpose()?;
    Ok(StoredVisit {
        rowid,
        event: VisitEvent {
            occupant,
            kind,
            timestamp,
            deadline,
        },
    })
}

fn parse_occupant_id(table: &'static str, raw: &str) -> Result<OccupantId, DbError> {
    OccupantId::new(raw).map_err(|e| DbError::InvalidColumn {
        table,
        column: "occupant_id",
        message: e.to_string(),
    })
}

fn parse_wall_time(raw: &str) -> Result<WallTime, DbError> {
    WallTime::parse(raw).map_err(|e| DbError::InvalidColumn {
        table: "status_history",
        column: "auto_open/auto_close",
        message: e.to_string(),
    })
}

fn parse_timestamp(table: &'static str, value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            value: value.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use turnstile_core::MembershipTier;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
    }

    fn db() -> Database {
        Database::open_in_memory(10, t0()).expect("open in-memory db")
    }

    fn id(s: &str) -> OccupantId {
        OccupantId::new(s).unwrap()
    }

    #[test]
    fn open_seeds_capacity_row() {
        let db = db();
        let snapshot = db.capacity().unwrap();
        assert_eq!(snapshot.max_capacity, 10);
        assert_eq!(snapshot.current_occupancy, 0);
        assert_eq!(snapshot.updated_at, t0());
    }

    #[test]
    fn init_is_idempotent() {
        let db = db();
        db.init(99, t0()).unwrap();
        // Re-init must not clobber the existing capacity row.
        assert_eq!(db.capacity().unwrap().max_capacity, 10);
    }

    #[test]
    fn append_moves_counter_with_the_log() {
        let mut db = db();
        let deadline = t0() + Duration::hours(1);

        let count = db
            .append_visit(&VisitEvent::entry(id("a"), t0(), deadline), None, t0())
            .unwrap();
        assert_eq!(count, 1);

        let count = db
            .append_visit(
                &VisitEvent::exit(id("a"), t0() + Duration::minutes(10)),
                None,
                t0() + Duration::minutes(10),
            )
            .unwrap();
        assert_eq!(count, 0);

        let visits = db.list_visits().unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].event.kind, VisitKind::Entry);
        assert_eq!(visits[0].event.deadline, Some(deadline));
        assert_eq!(visits[1].event.kind, VisitKind::Exit);
        assert!(visits[0].rowid < visits[1].rowid);
    }

    #[test]
    fn exit_clamps_counter_at_zero() {
        let mut db = db();
        let count = db
            .append_visit(&VisitEvent::exit(id("ghost"), t0()), None, t0())
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn append_updates_profile_in_same_transaction() {
        let mut db = db();
        let mut profile = OccupantProfile::new(id("a"), MembershipTier::Regular);
        profile.cooperativeness = Score::clamped(0.8);
        profile.last_visit = Some(t0());

        db.append_visit(&VisitEvent::exit(id("a"), t0()), Some(&profile), t0())
            .unwrap();

        let stored = db.get_occupant(&id("a")).unwrap().unwrap();
        assert_eq!(stored.cooperativeness.value(), 0.8);
        assert_eq!(stored.last_visit, Some(t0()));
    }

    #[test]
    fn rebuild_counter_derives_from_log() {
        let mut db = db();
        let deadline = t0() + Duration::hours(1);
        for name in ["a", "b", "c"] {
            db.append_visit(&VisitEvent::entry(id(name), t0(), deadline), None, t0())
                .unwrap();
        }
        db.append_visit(&VisitEvent::exit(id("b"), t0()), None, t0())
            .unwrap();

        // Simulate drift from an operator adjustment.
        db.set_current_occupancy(9, t0()).unwrap();
        assert_eq!(db.capacity().unwrap().current_occupancy, 9);

        let rebuilt = db.rebuild_counter(t0() + Duration::hours(2)).unwrap();
        assert_eq!(rebuilt, 2);
        assert_eq!(db.capacity().unwrap().current_occupancy, 2);
    }

    #[test]
    fn open_entries_reflects_last_event_per_occupant() {
        let mut db = db();
        let deadline = t0() + Duration::hours(1);

        db.append_visit(&VisitEvent::entry(id("in"), t0(), deadline), None, t0())
            .unwrap();
        db.append_visit(&VisitEvent::entry(id("out"), t0(), deadline), None, t0())
            .unwrap();
        db.append_visit(
            &VisitEvent::exit(id("out"), t0() + Duration::minutes(5)),
            None,
            t0(),
        )
        .unwrap();

        let open = db.open_entries().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].occupant, id("in"));
        assert_eq!(open[0].entered_at, t0());
        assert_eq!(open[0].deadline, deadline);
    }

    #[test]
    fn entry_count_in_range_is_half_open() {
        let mut db = db();
        let deadline = t0() + Duration::hours(1);
        for offset in [0, 10, 20] {
            db.append_visit(
                &VisitEvent::entry(id("a"), t0() + Duration::days(offset), deadline),
                None,
                t0(),
            )
            .unwrap();
            db.append_visit(
                &VisitEvent::exit(id("a"), t0() + Duration::days(offset) + Duration::hours(1)),
                None,
                t0(),
            )
            .unwrap();
        }

        let count = db
            .entry_count_in_range(&id("a"), t0(), t0() + Duration::days(20))
            .unwrap();
        assert_eq!(count, 2);
        let all = db
            .entry_count_in_range(&id("a"), t0() - Duration::days(1), t0() + Duration::days(30))
            .unwrap();
        assert_eq!(all, 3);
    }

    #[test]
    fn status_history_returns_latest() {
        let mut db = db();
        assert!(db.latest_status().unwrap().is_none());

        let first = StatusRecord {
            status: SpaceStatus::Open,
            message: None,
            auto_open: Some(WallTime::parse("09:00").unwrap()),
            auto_close: Some(WallTime::parse("18:00").unwrap()),
            auto_schedule_enabled: true,
            updated_at: t0(),
            updated_by: "operator".to_string(),
        };
        db.append_status(&first).unwrap();

        let second = StatusRecord {
            status: SpaceStatus::Maintenance,
            message: Some("fire drill".to_string()),
            updated_at: t0() + Duration::hours(1),
            ..first.clone()
        };
        db.append_status(&second).unwrap();

        let latest = db.latest_status().unwrap().unwrap();
        assert_eq!(latest, second);
    }

    #[test]
    fn occupant_profiles_roundtrip() {
        let mut db = db();
        let mut profile = OccupantProfile::new(id("alice"), MembershipTier::Privileged);
        profile.age = Some(34);
        profile.demographic = Some("student".to_string());
        profile.frequency_used = 4;

        db.upsert_occupant(&profile).unwrap();
        assert_eq!(db.get_occupant(&id("alice")).unwrap().unwrap(), profile);
        assert!(db.get_occupant(&id("nobody")).unwrap().is_none());

        profile.frequency_used = 5;
        db.upsert_occupant(&profile).unwrap();
        let listed = db.list_occupants().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].frequency_used, 5);
    }

    #[test]
    fn observations_roundtrip_and_prune() {
        let mut db = db();
        for i in 0..5 {
            db.insert_observation(&ObservationRow {
                timestamp: t0() + Duration::minutes(i),
                occupancy: f64::from(i as i32),
                entry_rate: 1.0,
                exit_rate: 0.25,
            })
            .unwrap();
        }

        let since = db.observations_since(t0() + Duration::minutes(2)).unwrap();
        assert_eq!(since.len(), 3);
        assert_eq!(since[0].occupancy, 2.0);
        assert!((since[0].net_rate() - 0.75).abs() < 1e-12);

        let removed = db.prune_observations(t0() + Duration::minutes(3)).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(db.observations_since(t0()).unwrap().len(), 2);
    }
}
