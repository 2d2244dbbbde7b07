//! Runtime for executing conversations
//!
//! `ConversationRuntime` runs the step graph over one loaded state;
//! `SessionManager` is the session boundary on top of it, serializing calls
//! per session id.

mod executor;
mod recovery;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationRuntime, PREDICTION_FAILED_MESSAGE};
pub use recovery::{recover, recover_sessions, RecoveryDecision, RecoveryReason};
pub use traits::*;

use crate::capabilities::CapabilityError;
use crate::state_machine::{ConversationState, Phase, Turn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

/// Type alias for the production manager with concrete implementations
pub type ProductionManager = SessionManager<
    DatabaseStorage,
    Arc<dyn Extractor>,
    Arc<dyn Classifier>,
    Arc<dyn Retriever>,
>;

/// Opening assistant turn of every session
pub const GREETING: &str = "Hello! I am your AI health assistant. Please provide your **Age**, \
**Glucose level**, and **BMI** to begin.";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid resume: {0}")]
    InvalidResume(String),
    #[error("Prediction failed: {0}")]
    PredictionFailed(#[source] CapabilityError),
    #[error("Message text is empty")]
    EmptyInput,
    #[error("Storage error: {0}")]
    Storage(String),
}

/// What one `advance` or `resume` call produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Turns appended during the call, user input included
    pub turns_appended: Vec<Turn>,
    /// True when the call ended with the gate armed before Predict
    pub gated: bool,
    pub phase: Phase,
}

impl TurnOutcome {
    fn new(state: &ConversationState, start: usize) -> Self {
        Self {
            turns_appended: state.turns_since(start),
            gated: state.is_gated(),
            phase: state.phase,
        }
    }
}

// ============================================================================
// Per-session locking
// ============================================================================

/// One async mutex per session id.
///
/// Calls on the same id are serialized; distinct ids never contend beyond
/// the brief map lookup.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the entry for `session_id` unless someone holds or awaits it
    pub fn prune(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// Session manager
// ============================================================================

/// Session boundary consumed by the presentation layer
pub struct SessionManager<S, E, C, R>
where
    S: SessionStore,
    E: Extractor,
    C: Classifier,
    R: Retriever,
{
    runtime: ConversationRuntime<S, E, C, R>,
    locks: SessionLocks,
}

impl<S, E, C, R> SessionManager<S, E, C, R>
where
    S: SessionStore,
    E: Extractor,
    C: Classifier,
    R: Retriever,
{
    pub fn new(runtime: ConversationRuntime<S, E, C, R>) -> Self {
        Self {
            runtime,
            locks: SessionLocks::new(),
        }
    }

    pub fn runtime(&self) -> &ConversationRuntime<S, E, C, R> {
        &self.runtime
    }

    /// Start a conversation under a fresh id
    pub async fn create_session(&self) -> Result<(String, ConversationState), ExecutorError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let state = ConversationState::with_greeting(GREETING);
        self.runtime
            .storage()
            .save(&session_id, &state)
            .await
            .map_err(ExecutorError::Storage)?;
        tracing::info!(session_id = %session_id, "Session created");
        Ok((session_id, state))
    }

    /// Run one user turn. An unknown id starts a new conversation.
    pub async fn advance(&self, session_id: &str, text: &str) -> Result<TurnOutcome, ExecutorError> {
        if text.trim().is_empty() {
            return Err(ExecutorError::EmptyInput);
        }
        let guard = self.locks.acquire(session_id).await;
        let result = async {
            let mut state = match self.load(session_id).await? {
                Some(state) => state,
                None => {
                    tracing::info!(session_id, "Session created on first message");
                    ConversationState::with_greeting(GREETING)
                }
            };
            self.runtime.advance(session_id, &mut state, text).await
        }
        .await;
        self.release(session_id, guard);
        result
    }

    /// Confirm the armed gate and run the analysis
    pub async fn resume(&self, session_id: &str) -> Result<TurnOutcome, ExecutorError> {
        let guard = self.locks.acquire(session_id).await;
        let result = async {
            let mut state = self
                .load(session_id)
                .await?
                .ok_or_else(|| ExecutorError::SessionNotFound(session_id.to_string()))?;
            self.runtime.resume(session_id, &mut state).await
        }
        .await;
        self.release(session_id, guard);
        result
    }

    /// Latest persisted snapshot
    pub async fn get_state(&self, session_id: &str) -> Result<ConversationState, ExecutorError> {
        let guard = self.locks.acquire(session_id).await;
        let result = self.load(session_id).await;
        self.release(session_id, guard);
        result?.ok_or_else(|| ExecutorError::SessionNotFound(session_id.to_string()))
    }

    /// Abandon a conversation. Returns false if it did not exist.
    pub async fn discard(&self, session_id: &str) -> Result<bool, ExecutorError> {
        let guard = self.locks.acquire(session_id).await;
        let deleted = self
            .runtime
            .storage()
            .delete(session_id)
            .await
            .map_err(ExecutorError::Storage);
        self.release(session_id, guard);
        let deleted = deleted?;

        if deleted {
            tracing::info!(session_id, "Session discarded");
        }
        Ok(deleted)
    }

    /// Unlock, then drop the table entry if no other call is queued on it
    fn release(&self, session_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.prune(session_id);
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, ExecutorError> {
        self.runtime
            .storage()
            .load(session_id)
            .await
            .map_err(ExecutorError::Storage)
    }
}
