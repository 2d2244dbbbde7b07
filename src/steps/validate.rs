//! Validate: plausibility guardrail over the collected metrics

use crate::state_machine::{ConversationState, Turn, ValidationRanges, ValidationStatus};

/// Check every present metric against `ranges`.
///
/// Runs only when the status is `Unset`. Any metric change resets it, so a
/// repeated run on unchanged metrics neither flips the status nor appends a
/// second corrective turn.
pub fn run_validate(state: &mut ConversationState, ranges: &ValidationRanges) -> ValidationStatus {
    if state.validation_status != ValidationStatus::Unset {
        return state.validation_status;
    }

    let violations = ranges.violations(&state.metrics);
    if violations.is_empty() {
        state.validation_status = ValidationStatus::Pass;
        return ValidationStatus::Pass;
    }

    let lines = violations
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    state.push_turn(Turn::assistant(format!(
        "Hmm, I noticed something a bit unusual:\n{lines}\n\nCould you please double-check \
         those numbers for me? Medical accuracy is important for a good assessment."
    )));
    state.validation_status = ValidationStatus::Fail;
    ValidationStatus::Fail
}
