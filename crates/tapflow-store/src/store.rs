//! Durable, deduplicating, append-only event log.
//!
//! # Thread Safety
//!
//! [`EventStore`] wraps its `rusqlite::Connection` in a `Mutex`, so a single
//! instance can be shared across the station's reader loop, the batch-sync
//! path, and metrics readers. The duplicate check and the insert run inside
//! one transaction while the lock is held, which makes `append` atomic with
//! respect to concurrent calls racing on the same logical tap.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond
//! precision (e.g. `2026-06-01T12:00:00.000Z`), so lexicographic ordering
//! matches chronological ordering. The `stage_counts` table is a projection
//! maintained in the same transaction as each insert; it always reflects
//! every record for which `append` has returned.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use thiserror::Error;

use tapflow_core::dedup::{DuplicateWindows, is_duplicate};
use tapflow_core::event::{Origin, TapRecord, ValidTap};
use tapflow_core::stage::Stage;
use tapflow_core::types::{CardUid, SessionId, TokenId};

/// Unrecoverable persistence failures.
///
/// A duplicate is never an error; it is a normal [`AppendOutcome`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for record {seq}: {timestamp}")]
    TimestampParse {
        seq: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored field no longer decodes into its domain type.
    #[error("invalid field in record {seq}: {message}")]
    InvalidRecord { seq: i64, message: String },
}

/// What `append` did with a candidate tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// No record matched inside the duplicate window; a new record was
    /// persisted.
    Inserted(TapRecord),
    /// The same logical tap was already retained; nothing was written.
    DuplicateOf(TapRecord),
}

/// The authoritative event log.
pub struct EventStore {
    conn: Mutex<Connection>,
    windows: DuplicateWindows,
}

/// Raw row as stored, before decoding into domain types.
struct RecordRow {
    seq: i64,
    token_id: String,
    uid: String,
    stage: String,
    session_id: String,
    origin: String,
    observed_at: String,
    received_at: String,
}

const SELECT_COLUMNS: &str =
    "seq, token_id, uid, stage, session_id, origin, observed_at, received_at";

impl EventStore {
    /// Opens a store at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open; WAL mode keeps readers from
    /// blocking behind the writer.
    pub fn open(path: &Path, windows: DuplicateWindows) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
            windows,
        };
        store.init()?;
        Ok(store)
    }

    /// Opens an in-memory store. Useful for testing.
    pub fn open_in_memory(windows: DuplicateWindows) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            windows,
        };
        store.init()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                token_id TEXT NOT NULL,
                uid TEXT NOT NULL,
                stage TEXT NOT NULL,
                session_id TEXT NOT NULL,
                origin TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                received_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
            CREATE INDEX IF NOT EXISTS idx_events_observed ON events(session_id, observed_at);
            CREATE INDEX IF NOT EXISTS idx_events_dedup
                ON events(session_id, token_id, stage, observed_at);

            CREATE TABLE IF NOT EXISTS stage_counts (
                session_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (session_id, stage)
            );
            ",
        )?;
        Ok(())
    }

    /// Appends a validated tap unless it duplicates a retained record.
    ///
    /// The check-and-insert is one transaction: of any number of concurrent
    /// calls for the same logical tap, exactly one observes `Inserted`.
    pub fn append(&self, tap: &ValidTap) -> Result<AppendOutcome, StoreError> {
        let window = self.windows.window_for(&tap.stage);
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing = {
            let mut stmt = tx.prepare(&format!(
                "
                SELECT {SELECT_COLUMNS}
                FROM events
                WHERE session_id = ? AND token_id = ? AND stage = ?
                    AND observed_at >= ? AND observed_at <= ?
                ORDER BY observed_at ASC, seq ASC
                LIMIT 1
                "
            ))?;
            stmt.query_row(
                params![
                    tap.session_id.as_str(),
                    tap.token_id.as_str(),
                    tap.stage.as_str(),
                    format_timestamp(tap.observed_at - window),
                    format_timestamp(tap.observed_at + window),
                ],
                read_row,
            )
            .optional()?
        };

        if let Some(row) = existing {
            let record = decode_row(row)?;
            debug_assert!(is_duplicate(record.observed_at, tap.observed_at, window));
            tracing::debug!(
                token = %tap.token_id,
                stage = %tap.stage,
                duplicate_of = record.seq,
                "duplicate tap rejected"
            );
            return Ok(AppendOutcome::DuplicateOf(record));
        }

        let received_at = Utc::now();
        tx.execute(
            "
            INSERT INTO events (token_id, uid, stage, session_id, origin, observed_at, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                tap.token_id.as_str(),
                tap.uid.as_str(),
                tap.stage.as_str(),
                tap.session_id.as_str(),
                tap.origin.to_string(),
                format_timestamp(tap.observed_at),
                format_timestamp(received_at),
            ],
        )?;
        let seq = tx.last_insert_rowid();
        tx.execute(
            "
            INSERT INTO stage_counts (session_id, stage, count)
            VALUES (?, ?, 1)
            ON CONFLICT(session_id, stage) DO UPDATE SET count = count + 1
            ",
            params![tap.session_id.as_str(), tap.stage.as_str()],
        )?;
        tx.commit()?;

        tracing::debug!(seq, token = %tap.token_id, stage = %tap.stage, "tap persisted");
        Ok(AppendOutcome::Inserted(TapRecord {
            seq,
            token_id: tap.token_id.clone(),
            uid: tap.uid.clone(),
            stage: tap.stage.clone(),
            session_id: tap.session_id.clone(),
            origin: tap.origin.clone(),
            observed_at: tap.observed_at,
            received_at,
        }))
    }

    /// Lists a session's records ordered by `observed_at`, with
    /// `received_at` then `seq` as tie-breaks.
    pub fn query(
        &self,
        session_id: &SessionId,
        stage: Option<&Stage>,
        time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<TapRecord>, StoreError> {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events WHERE session_id = ?"
        );
        let mut bindings: Vec<String> = vec![session_id.as_str().to_string()];
        if let Some(stage) = stage {
            sql.push_str(" AND stage = ?");
            bindings.push(stage.as_str().to_string());
        }
        if let Some((start, end)) = time_range {
            sql.push_str(" AND observed_at >= ? AND observed_at < ?");
            bindings.push(format_timestamp(start));
            bindings.push(format_timestamp(end));
        }
        sql.push_str(" ORDER BY observed_at ASC, received_at ASC, seq ASC");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings.iter()), read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_row(row?)?);
        }
        Ok(records)
    }

    /// Per-stage record counts for a session, served from the projection.
    pub fn count_by_stage(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT stage, count FROM stage_counts WHERE session_id = ? ORDER BY stage ASC",
        )?;
        let rows = stmt.query_map([session_id.as_str()], |row| {
            let stage: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((stage, count))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (stage, count) = row?;
            counts.insert(stage, count);
        }
        Ok(counts)
    }

    /// Total record count, optionally scoped to one session.
    pub fn event_count(&self, session_id: Option<&SessionId>) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count = match session_id {
            Some(session) => conn.query_row(
                "SELECT COUNT(*) FROM events WHERE session_id = ?",
                [session.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// The session's most recent records, newest first.
    pub fn recent_events(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<TapRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {SELECT_COLUMNS}
            FROM events
            WHERE session_id = ?
            ORDER BY observed_at DESC, received_at DESC, seq DESC
            LIMIT ?
            "
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![session_id.as_str(), limit], read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_row(row?)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
impl EventStore {
    /// Simulates an unrecoverable persistence failure for fault tests.
    pub(crate) fn hide_events_table(&self) {
        self.lock()
            .execute_batch("ALTER TABLE events RENAME TO events_hidden;")
            .expect("rename events table");
    }

    /// Undoes [`Self::hide_events_table`].
    pub(crate) fn restore_events_table(&self) {
        self.lock()
            .execute_batch("ALTER TABLE events_hidden RENAME TO events;")
            .expect("restore events table");
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        seq: row.get(0)?,
        token_id: row.get(1)?,
        uid: row.get(2)?,
        stage: row.get(3)?,
        session_id: row.get(4)?,
        origin: row.get(5)?,
        observed_at: row.get(6)?,
        received_at: row.get(7)?,
    })
}

fn decode_row(row: RecordRow) -> Result<TapRecord, StoreError> {
    let seq = row.seq;
    let invalid = |message: String| StoreError::InvalidRecord { seq, message };

    Ok(TapRecord {
        seq,
        token_id: TokenId::new(row.token_id).map_err(|err| invalid(err.to_string()))?,
        uid: CardUid::new(row.uid).map_err(|err| invalid(err.to_string()))?,
        stage: Stage::new(row.stage).map_err(|err| invalid(err.to_string()))?,
        session_id: SessionId::new(row.session_id).map_err(|err| invalid(err.to_string()))?,
        origin: row
            .origin
            .parse::<Origin>()
            .map_err(|err| invalid(err.to_string()))?,
        observed_at: parse_timestamp(&row.observed_at, seq)?,
        received_at: parse_timestamp(&row.received_at, seq)?,
    })
}

fn parse_timestamp(timestamp: &str, seq: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse {
            seq,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
