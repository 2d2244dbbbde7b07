//! API request and response types

use crate::db::SessionSummary;
use crate::runtime::TurnOutcome;
use crate::state_machine::{
    ConversationState, MetricField, Metrics, Phase, Prediction, RiskBand, RiskLabel, StepName,
    Turn, ValidationStatus,
};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Everything the presentation layer renders for one session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub history: Vec<Turn>,
    pub metrics: Metrics,
    pub missing_fields: Vec<MetricField>,
    pub validation_status: ValidationStatus,
    pub prediction: Option<Prediction>,
    pub advice: Option<String>,
    pub pending_step: Option<StepName>,
    pub phase: Phase,
    /// Gauge chart data, present once a prediction exists
    pub gauge: Option<GaugeView>,
}

impl SessionView {
    pub fn new(session_id: impl Into<String>, state: ConversationState) -> Self {
        let gauge = state.prediction.as_ref().map(GaugeView::from);
        Self {
            session_id: session_id.into(),
            missing_fields: state.metrics.missing_required(),
            history: state.history,
            metrics: state.metrics,
            validation_status: state.validation_status,
            prediction: state.prediction,
            advice: state.advice,
            pending_step: state.pending_step,
            phase: state.phase,
            gauge,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GaugeView {
    pub label: RiskLabel,
    /// 0 to 100, two decimals
    pub percent: f64,
    pub band: RiskBand,
}

impl From<&Prediction> for GaugeView {
    fn from(prediction: &Prediction) -> Self {
        Self {
            label: prediction.label,
            percent: prediction.percent(),
            band: prediction.band(),
        }
    }
}

/// Response to a chat message
#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub turns_appended: Vec<Turn>,
    pub gated: bool,
    pub phase: Phase,
}

impl From<TurnOutcome> for AdvanceResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            turns_appended: outcome.turns_appended,
            gated: outcome.gated,
            phase: outcome.phase,
        }
    }
}

/// Response to a resume
#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub turns_appended: Vec<Turn>,
    pub phase: Phase,
}

impl From<TurnOutcome> for ResumeResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            turns_appended: outcome.turns_appended,
            phase: outcome.phase,
        }
    }
}

/// Response with a list of sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
