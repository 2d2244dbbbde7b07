//! Trait abstractions for runtime I/O
//!
//! The executor only talks to the outside world through these traits, so
//! tests can drive it with the mocks in `runtime::testing`.

use crate::capabilities::CapabilityError;
use crate::db::{Database, SessionRecord};
use crate::state_machine::{ConversationState, FeatureVector, Metrics, Prediction, Turn};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable store of conversation snapshots keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the latest snapshot, None if the session does not exist
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, String>;

    /// Insert or replace the snapshot
    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), String>;

    /// Forget a session. Returns false if it did not exist.
    async fn delete(&self, session_id: &str) -> Result<bool, String>;
}

/// What the extraction capability found in one utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Only the fields recognized in this utterance are set
    pub metrics: Metrics,
    /// Conversational reply to show the user, if the capability wrote one
    pub reply: Option<String>,
}

/// Reads clinical metrics out of free text
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        history: &[Turn],
        current: &Metrics,
    ) -> Result<Extraction, CapabilityError>;
}

/// Black-box risk model.
///
/// The feature order is a contract with the model artifact.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, CapabilityError>;

    fn model_id(&self) -> &str;
}

/// Best-effort text retrieval
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, CapabilityError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, String> {
        (**self).load(session_id).await
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), String> {
        (**self).save(session_id, state).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        (**self).delete(session_id).await
    }
}

#[async_trait]
impl<T: Extractor + ?Sized> Extractor for Arc<T> {
    async fn extract(
        &self,
        text: &str,
        history: &[Turn],
        current: &Metrics,
    ) -> Result<Extraction, CapabilityError> {
        (**self).extract(text, history, current).await
    }
}

#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, CapabilityError> {
        (**self).predict(features).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: Retriever + ?Sized> Retriever for Arc<T> {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        (**self).search(query).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `SessionStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, String> {
        self.db
            .find_session(session_id)
            .map(|record| record.map(|SessionRecord { state, .. }| state))
            .map_err(|e| e.to_string())
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), String> {
        self.db
            .save_state(session_id, state)
            .map_err(|e| e.to_string())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        self.db
            .delete_session(session_id)
            .map_err(|e| e.to_string())
    }
}
