//! Enrich: attach retrieved lifestyle advice to the prediction

use crate::runtime::Retriever;
use crate::state_machine::{ConversationState, Prediction, RiskLabel, Turn};

/// Advice recorded when retrieval fails
pub const ADVICE_UNAVAILABLE: &str = "Personalized recommendations are unavailable right now. \
Please consult a healthcare professional for diet and lifestyle guidance.";

pub fn enrichment_query(age: Option<f64>, label: RiskLabel) -> String {
    let risk = match label {
        RiskLabel::HighRisk => "high",
        RiskLabel::LowRisk => "low",
    };
    match age {
        Some(age) => format!(
            "Vegetarian diet and lifestyle tips for a {age} year old with {risk} diabetes risk"
        ),
        None => format!("Vegetarian diet and lifestyle tips for {risk} diabetes risk"),
    }
}

/// Search for advice and append the final assessment turn.
///
/// Retrieval failure degrades to `ADVICE_UNAVAILABLE`; the prediction is
/// always reported. Returns whether real advice was retrieved.
pub async fn run_enrich<R: Retriever + ?Sized>(
    state: &mut ConversationState,
    retriever: &R,
) -> bool {
    let Some(prediction) = state.prediction else {
        tracing::warn!("Enrich reached without a prediction");
        return false;
    };

    let query = enrichment_query(state.metrics.age, prediction.label);
    let (advice, retrieved) = match retriever.search(&query).await {
        Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), true),
        Ok(_) => {
            tracing::warn!(query = %query, "Retrieval returned empty text");
            (ADVICE_UNAVAILABLE.to_string(), false)
        }
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "Retrieval failed, degrading");
            (ADVICE_UNAVAILABLE.to_string(), false)
        }
    };

    state.push_turn(Turn::assistant(final_message(&prediction, &advice)));
    state.advice = Some(advice);
    retrieved
}

fn final_message(prediction: &Prediction, advice: &str) -> String {
    format!(
        "### Assessment Result\nBased on your metrics, your result is: **{}**\n\n\
         ### Personalized Recommendations\n{advice}",
        prediction.summary()
    )
}
