//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Engine components call
//! store methods; they never execute SQL directly. The store realizes
//! the three external contracts the engine depends on: the appointment
//! store (with optimistic concurrency), the roster snapshot provider,
//! and the append-only audit log.

mod appointment;
mod audit;
mod roster;

use crate::error::DispatchResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub struct DispatchStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file/URI
}

impl DispatchStore {
    pub fn open(path: &str) -> DispatchResult<Self> {
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
    pub fn in_memory() -> DispatchResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For plain in-memory databases this returns a fresh, isolated
    /// database; business workers that need a shared view open a
    /// `file:name?mode=memory&cache=shared` URI or a real file.
    pub fn reopen(&self) -> DispatchResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DispatchResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_audit.sql"))?;
        Ok(())
    }
}

// ── Column decoding helpers ──────────────────────────────────────────

fn bad_column(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}

fn id_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| bad_column(idx, Box::new(e)))
}

fn opt_id_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| Uuid::parse_str(&s).map_err(|e| bad_column(idx, Box::new(e))))
        .transpose()
}

fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| bad_column(idx, Box::new(e)))
}
