//! Predict: run the classifier on the validated metrics

use crate::capabilities::CapabilityError;
use crate::runtime::Classifier;
use crate::state_machine::{ConversationState, Prediction, ValidationStatus};

/// Record the classifier's verdict. No retry: a failure leaves `prediction`
/// unset and is returned to the executor.
pub async fn run_predict<C: Classifier + ?Sized>(
    state: &mut ConversationState,
    classifier: &C,
) -> Result<Prediction, CapabilityError> {
    if state.validation_status != ValidationStatus::Pass {
        return Err(CapabilityError::malformed(
            "metrics have not passed validation",
        ));
    }
    let features = state.metrics.features().ok_or_else(|| {
        CapabilityError::malformed("required metrics are missing")
    })?;

    let prediction = classifier.predict(&features).await?;
    tracing::info!(
        model = classifier.model_id(),
        label = prediction.label.as_str(),
        probability = prediction.probability,
        "Prediction complete"
    );
    state.prediction = Some(prediction);
    Ok(prediction)
}
