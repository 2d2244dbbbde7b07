//! Database module
//!
//! Durable session store: one row per conversation holding the serialized
//! `ConversationState` and its resumption point.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored state for session {id} is unreadable: {source}")]
    CorruptState {
        id: String,
        source: serde_json::Error,
    },
    #[error("Failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Raw row before the state JSON is decoded
type SessionRow = (String, String, String, String);

const SESSION_COLUMNS: &str = "id, state, created_at, updated_at";

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Session Operations ====================

    /// Get session by ID, None if missing
    pub fn find_session(&self, id: &str) -> DbResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()?;

        row.map(decode_row).transpose()
    }

    /// Insert or replace the state of a session
    pub fn save_state(&self, id: &str, state: &ConversationState) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now();
        let state_json = serde_json::to_string(state).map_err(DbError::Encode)?;

        conn.execute(
            "INSERT INTO sessions (id, state, phase, pending_step, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                phase = excluded.phase,
                pending_step = excluded.pending_step,
                updated_at = excluded.updated_at",
            params![
                id,
                state_json,
                state.phase.as_str(),
                state.pending_step.map(|s| s.as_str()),
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete a session. Returns false if there was nothing to delete.
    pub fn delete_session(&self, id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// List sessions, most recently updated first
    pub fn list_sessions(&self) -> DbResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Sessions whose persisted phase is one of `phases`
    pub fn sessions_in_phases(&self, phases: &[Phase]) -> DbResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE phase = ?1"
        ))?;

        let mut rows = Vec::new();
        for phase in phases {
            let matched = stmt
                .query_map(params![phase.as_str()], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.extend(matched);
        }
        rows.into_iter().map(decode_row).collect()
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row((id, state_json, created_at, updated_at): SessionRow) -> DbResult<SessionRecord> {
    let state = serde_json::from_str(&state_json).map_err(|source| DbError::CorruptState {
        id: id.clone(),
        source,
    })?;
    Ok(SessionRecord {
        id,
        state,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
