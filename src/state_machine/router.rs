//! Routing decisions between steps
//!
//! Both decision points are pure functions of the state. The executor
//! dispatches on the returned variant.

use super::state::{ConversationState, ValidationStatus};

/// Decision after Extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterExtract {
    /// All required metrics present, run Validate in the same turn
    Validate,
    /// End the turn and wait for more user input
    Wait,
}

/// Decision after Validate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterValidate {
    /// Advance toward Predict (the gate holds it until confirmed)
    Predict,
    /// Validation failed; the corrective turn is already in the history
    Wait,
}

pub fn route_after_extract(state: &ConversationState) -> AfterExtract {
    if state.metrics.has_required() {
        AfterExtract::Validate
    } else {
        AfterExtract::Wait
    }
}

pub fn route_after_validate(state: &ConversationState) -> AfterValidate {
    if state.validation_status == ValidationStatus::Pass {
        AfterValidate::Predict
    } else {
        AfterValidate::Wait
    }
}
