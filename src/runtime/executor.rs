//! Graph executor
//!
//! Drives Extract → Validate → [gate] → Predict → Enrich over a loaded
//! `ConversationState`, persisting after every step boundary. The gate is a
//! persisted continuation (`pending_step`), not a suspended call, so it
//! survives process restarts.

use super::traits::{Classifier, Extractor, Retriever, SessionStore};
use super::{ExecutorError, TurnOutcome};
use crate::state_machine::{
    route_after_extract, route_after_validate, AfterExtract, AfterValidate, ConversationState,
    Phase, StepName, Turn, ValidationRanges, ValidationStatus,
};
use crate::steps::{run_enrich, run_extract, run_predict, run_validate, ExtractOutcome};

/// Assistant turn appended when the classifier fails
pub const PREDICTION_FAILED_MESSAGE: &str = "Sorry, the clinical analysis could not be \
completed right now. Your information is saved; send another message to try again.";

/// Generic conversation runtime over any store and capability implementations
pub struct ConversationRuntime<S, E, C, R>
where
    S: SessionStore,
    E: Extractor,
    C: Classifier,
    R: Retriever,
{
    storage: S,
    extractor: E,
    classifier: C,
    retriever: R,
    ranges: ValidationRanges,
}

impl<S, E, C, R> ConversationRuntime<S, E, C, R>
where
    S: SessionStore,
    E: Extractor,
    C: Classifier,
    R: Retriever,
{
    pub fn new(
        storage: S,
        extractor: E,
        classifier: C,
        retriever: R,
        ranges: ValidationRanges,
    ) -> Self {
        Self {
            storage,
            extractor,
            classifier,
            retriever,
            ranges,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// One normal turn: record the utterance, extract, and validate when all
    /// required metrics are present. Arms the gate instead of predicting.
    ///
    /// Allowed while gated: the armed gate is dropped first and only
    /// re-armed if the new metrics pass validation again.
    pub async fn advance(
        &self,
        session_id: &str,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<TurnOutcome, ExecutorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ExecutorError::EmptyInput);
        }

        let start = state.history.len();
        state.push_turn(Turn::user(text));
        if state.pending_step.take().is_some() {
            tracing::debug!(session_id, "New input while gated, gate dropped");
        }

        // Extract
        match run_extract(state, text, &self.extractor, &self.ranges).await {
            ExtractOutcome::Extracted { changed } => {
                tracing::debug!(session_id, step = %StepName::Extract, changed, "Step complete");
            }
            ExtractOutcome::Failed(e) => {
                tracing::info!(session_id, step = %StepName::Extract, kind = %e.kind, "User asked to restate");
            }
        }
        let after_extract = route_after_extract(state);
        state.phase = match after_extract {
            AfterExtract::Validate => Phase::ReadyToValidate,
            AfterExtract::Wait => resting_phase(state),
        };
        self.persist(session_id, state).await?;

        if after_extract == AfterExtract::Wait {
            return Ok(TurnOutcome::new(state, start));
        }

        // Validate
        let status = run_validate(state, &self.ranges);
        tracing::debug!(session_id, step = %StepName::Validate, ?status, "Step complete");

        match route_after_validate(state) {
            AfterValidate::Wait => {
                state.phase = resting_phase(state);
            }
            AfterValidate::Predict if state.prediction.is_some() => {
                // Already confirmed and predicted for this snapshot
                state.phase = Phase::Done;
            }
            AfterValidate::Predict => {
                state.pending_step = Some(StepName::Predict);
                state.phase = Phase::GatedForPredict;
                tracing::info!(session_id, phase = %state.phase, "Gate armed before predict");
            }
        }
        self.persist(session_id, state).await?;

        Ok(TurnOutcome::new(state, start))
    }

    /// Proceed through an armed gate: Predict, then Enrich.
    ///
    /// Takes no input. Prediction failure clears the gate, returns the
    /// conversation to collecting and is reported as an error.
    pub async fn resume(
        &self,
        session_id: &str,
        state: &mut ConversationState,
    ) -> Result<TurnOutcome, ExecutorError> {
        if !state.is_gated() {
            return Err(ExecutorError::InvalidResume(format!(
                "no step is pending (phase {})",
                state.phase
            )));
        }
        if state.validation_status != ValidationStatus::Pass || !state.metrics.has_required() {
            return Err(ExecutorError::InvalidResume(
                "gate is armed for metrics that have not passed validation".to_string(),
            ));
        }

        let start = state.history.len();
        state.pending_step = None;
        state.phase = Phase::Analyzing;
        self.persist(session_id, state).await?;

        // Predict
        if let Err(e) = run_predict(state, &self.classifier).await {
            tracing::error!(session_id, step = %StepName::Predict, error = %e, "Prediction failed");
            state.push_turn(Turn::assistant(PREDICTION_FAILED_MESSAGE));
            state.phase = Phase::Collecting;
            self.persist(session_id, state).await?;
            return Err(ExecutorError::PredictionFailed(e));
        }
        self.persist(session_id, state).await?;

        // Enrich
        let retrieved = run_enrich(state, &self.retriever).await;
        tracing::debug!(session_id, step = %StepName::Enrich, retrieved, "Step complete");

        state.phase = Phase::Done;
        self.persist(session_id, state).await?;
        tracing::info!(session_id, phase = %state.phase, "Analysis complete");

        Ok(TurnOutcome::new(state, start))
    }

    async fn persist(
        &self,
        session_id: &str,
        state: &ConversationState,
    ) -> Result<(), ExecutorError> {
        self.storage
            .save(session_id, state)
            .await
            .map_err(ExecutorError::Storage)
    }
}

/// Phase a turn ends in when it waits for more user input
fn resting_phase(state: &ConversationState) -> Phase {
    if state.prediction.is_some() {
        Phase::Done
    } else {
        Phase::Collecting
    }
}
