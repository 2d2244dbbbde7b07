//! Conversation recovery logic
//!
//! A turn never ends in `ready_to_validate` or `analyzing`. Finding one of
//! those persisted at startup means the process died mid-step, so the
//! conversation is moved back to the last point it can safely continue from.

use crate::db::{Database, DbResult};
use crate::state_machine::{ConversationState, Phase, StepName, ValidationStatus};

/// Result of analyzing a persisted state for recovery
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDecision {
    /// The repaired state
    pub state: ConversationState,
    /// Reason for the decision (for debugging)
    pub reason: RecoveryReason,
}

/// Why we made a particular recovery decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    /// Died during Predict or Enrich; the gate is re-armed
    InterruptedAnalysis,
    /// Died during Predict or Enrich on metrics that no longer pass
    InterruptedAnalysisUnvalidated,
    /// Died between Extract and Validate; next message re-validates
    InterruptedValidation,
    /// Gate armed on metrics that have not passed validation
    InconsistentGate,
}

/// Decide how to repair `state`. None when it needs no repair.
pub fn recover(state: &ConversationState) -> Option<RecoveryDecision> {
    let mut repaired = state.clone();

    let reason = match state.phase {
        Phase::Analyzing => {
            repaired.prediction = None;
            repaired.advice = None;
            if state.validation_status == ValidationStatus::Pass && state.metrics.has_required() {
                repaired.pending_step = Some(StepName::Predict);
                repaired.phase = Phase::GatedForPredict;
                RecoveryReason::InterruptedAnalysis
            } else {
                repaired.pending_step = None;
                repaired.validation_status = ValidationStatus::Unset;
                repaired.phase = Phase::Collecting;
                RecoveryReason::InterruptedAnalysisUnvalidated
            }
        }
        Phase::ReadyToValidate => {
            repaired.pending_step = None;
            if state.prediction.is_some() {
                repaired.phase = Phase::Done;
            } else {
                // Next advance validates from scratch
                repaired.validation_status = ValidationStatus::Unset;
                repaired.phase = Phase::Collecting;
            }
            RecoveryReason::InterruptedValidation
        }
        Phase::GatedForPredict | Phase::Collecting | Phase::Done
            if state.is_gated()
                && (state.validation_status != ValidationStatus::Pass
                    || !state.metrics.has_required()) =>
        {
            repaired.pending_step = None;
            repaired.phase = Phase::Collecting;
            RecoveryReason::InconsistentGate
        }
        Phase::GatedForPredict | Phase::Collecting | Phase::Done => return None,
    };

    Some(RecoveryDecision {
        state: repaired,
        reason,
    })
}

/// Repair every session left mid-step. Returns how many were changed.
pub fn recover_sessions(db: &Database) -> DbResult<usize> {
    let candidates = db.sessions_in_phases(&[
        Phase::Analyzing,
        Phase::ReadyToValidate,
        Phase::GatedForPredict,
    ])?;

    let mut repaired = 0;
    for record in candidates {
        let Some(decision) = recover(&record.state) else {
            continue;
        };
        tracing::info!(
            session_id = %record.id,
            from = %record.state.phase,
            to = %decision.state.phase,
            reason = ?decision.reason,
            "Recovered interrupted session"
        );
        db.save_state(&record.id, &decision.state)?;
        repaired += 1;
    }
    Ok(repaired)
}
