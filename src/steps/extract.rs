//! Extract: merge metrics found in the latest utterance

use crate::capabilities::CapabilityError;
use crate::runtime::Extractor;
use crate::state_machine::{
    ConversationState, MetricField, Metrics, RangeViolation, Turn, ValidationRanges,
    ValidationStatus,
};

/// Assistant turn used when the extraction capability fails
pub const RESTATE_MESSAGE: &str = "Sorry, I had trouble reading that. Could you restate your \
information? For example: \"I'm 45, my glucose is 130 and my BMI is 29.\"";

#[derive(Debug)]
pub enum ExtractOutcome {
    /// Extraction ran; `changed` is true when any metric value changed
    Extracted { changed: bool },
    /// Capability failed; metrics untouched and the user was asked to restate
    Failed(CapabilityError),
}

/// Run extraction for `text` and append exactly one assistant turn.
///
/// A metric change resets validation and drops any prior prediction and
/// advice, since they described the old values.
pub async fn run_extract<E: Extractor + ?Sized>(
    state: &mut ConversationState,
    text: &str,
    extractor: &E,
    ranges: &ValidationRanges,
) -> ExtractOutcome {
    match extractor.extract(text, &state.history, &state.metrics).await {
        Ok(extraction) => {
            let changed = state.metrics.merge(&extraction.metrics);
            if changed {
                state.invalidate_analysis();
            }
            let reply = extraction.reply.unwrap_or_else(|| {
                let violations = ranges.violations(&state.metrics);
                compose_reply(&state.metrics, changed, state.validation_status, &violations)
            });
            state.push_turn(Turn::assistant(reply));
            ExtractOutcome::Extracted { changed }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Extraction failed, asking user to restate");
            state.push_turn(Turn::assistant(RESTATE_MESSAGE));
            ExtractOutcome::Failed(e)
        }
    }
}

/// Reply used when the capability did not write one.
///
/// Readiness is announced only when nothing is out of range. With a failed
/// validation still standing, Validate will not speak again until a value
/// changes, so the reply repeats what needs correcting.
pub fn compose_reply(
    metrics: &Metrics,
    changed: bool,
    status: ValidationStatus,
    violations: &[RangeViolation],
) -> String {
    let missing = metrics.missing_required();

    if missing.is_empty() {
        if status == ValidationStatus::Fail && !violations.is_empty() {
            let lines = violations
                .iter()
                .map(|v| format!("- {v}"))
                .collect::<Vec<_>>()
                .join("\n");
            return format!(
                "Before I can run the analysis, these values still need correcting:\n{lines}\n\n\
                 Could you share the corrected numbers?"
            );
        }

        let summary = MetricField::REQUIRED
            .iter()
            .filter_map(|f| metrics.get(*f).map(|v| format!("{} {v}", f.label())))
            .collect::<Vec<_>>()
            .join(", ");
        if violations.is_empty() {
            return format!(
                "Thank you! I have your {summary}. I'm ready to perform the clinical analysis."
            );
        }
        return format!("Thank you! I have your {summary}.");
    }

    let wanted = join_names(&missing);
    if changed {
        format!("Thanks, noted. Could you also share your {wanted}?")
    } else {
        format!("I didn't catch any new measurements there. Could you share your {wanted}?")
    }
}

fn join_names(fields: &[MetricField]) -> String {
    let names: Vec<String> = fields.iter().map(|f| format!("**{}**", f.label())).collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
