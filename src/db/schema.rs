//! Database schema and types

pub use crate::state_machine::{ConversationState, Phase};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'collecting',
    pending_step TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_phase ON sessions(phase);
CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);
";

/// A persisted conversation
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry without the full history
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub phase: Phase,
    pub pending_step: Option<String>,
    pub turn_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            phase: record.state.phase,
            pending_step: record.state.pending_step.map(|s| s.to_string()),
            turn_count: record.state.history.len(),
            updated_at: record.updated_at,
        }
    }
}
