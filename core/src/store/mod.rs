//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods and never executes SQL directly.

use crate::{
    error::PlanResult,
    event::{EventLogEntry, PlanEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

mod fx_snapshot;
mod globals;
mod lines;
mod outputs;

pub use globals::{names as global_names, PlanGlobals};
pub use lines::NewLineRow;
pub use outputs::{output_values, OutputRow, StoredTotals, WriteBack, OUTPUT_COLUMNS};

pub struct PlanStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PlanStore {
    pub fn open(path: &str) -> PlanResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PlanResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Safe to run on every open.
    pub fn migrate(&self) -> PlanResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_lines.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_fx_snapshot.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &PlanEvent, at: DateTime<Utc>) -> PlanResult<()> {
        insert_event(&self.conn, event, at)
    }

    pub fn events(&self) -> PlanResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, payload, recorded_at
             FROM event_log ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    event_type:  row.get(1)?,
                    payload:     row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> PlanResult<i64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

/// Shared by the plain event append and the batched write-back.
fn insert_event(conn: &Connection, event: &PlanEvent, at: DateTime<Utc>) -> PlanResult<()> {
    conn.execute(
        "INSERT INTO event_log (event_type, payload, recorded_at) VALUES (?1, ?2, ?3)",
        params![event.type_name(), serde_json::to_string(event)?, at.to_rfc3339()],
    )?;
    Ok(())
}
