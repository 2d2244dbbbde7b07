//! Conversation state types

use super::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Turns
// ============================================================================

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// ============================================================================
// Steps, phases and outcomes
// ============================================================================

/// Named steps of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Extract,
    Validate,
    Predict,
    Enrich,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::Extract => "extract",
            StepName::Validate => "validate",
            StepName::Predict => "predict",
            StepName::Enrich => "enrich",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the conversation is in the graph.
///
/// `ReadyToValidate` and `Analyzing` only survive a turn if the process dies
/// mid-step; startup recovery repairs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Collecting,
    ReadyToValidate,
    GatedForPredict,
    Analyzing,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Collecting => "collecting",
            Phase::ReadyToValidate => "ready_to_validate",
            Phase::GatedForPredict => "gated_for_predict",
            Phase::Analyzing => "analyzing",
            Phase::Done => "done",
        }
    }

    /// Phases a turn never ends in
    pub fn is_transient(self) -> bool {
        matches!(self, Phase::ReadyToValidate | Phase::Analyzing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the guardrail check for the current metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unset,
    Pass,
    Fail,
}

// ============================================================================
// Prediction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    HighRisk,
    LowRisk,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::HighRisk => "high_risk",
            RiskLabel::LowRisk => "low_risk",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RiskLabel::HighRisk => "High Risk",
            RiskLabel::LowRisk => "Low Risk",
        }
    }
}

/// Gauge band for rendering the probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

/// Classifier output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: RiskLabel,
    /// Probability of the positive class, in [0, 1]
    pub probability: f64,
}

impl Prediction {
    pub fn new(label: RiskLabel, probability: f64) -> Self {
        Self {
            label,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Probability as a percentage rounded to two decimals
    pub fn percent(&self) -> f64 {
        (self.probability * 10_000.0).round() / 100.0
    }

    pub fn band(&self) -> RiskBand {
        let pct = self.percent();
        if pct <= 30.0 {
            RiskBand::Low
        } else if pct <= 70.0 {
            RiskBand::Moderate
        } else {
            RiskBand::High
        }
    }

    /// e.g. "High Risk (78% probability)"
    pub fn summary(&self) -> String {
        format!("{} ({}% probability)", self.label.display_name(), self.percent())
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// The unit of persistence and the only channel between steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub advice: Option<String>,
    /// Step the executor is paused before
    #[serde(default)]
    pub pending_step: Option<StepName>,
    #[serde(default)]
    pub phase: Phase,
}

impl ConversationState {
    /// Fresh conversation opening with the assistant's request for data
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            history: vec![Turn::assistant(greeting)],
            ..Self::default()
        }
    }

    pub fn is_gated(&self) -> bool {
        self.pending_step == Some(StepName::Predict)
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Text of the most recent user turn
    pub fn last_user_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    /// Turns appended since the history had `len` entries
    pub fn turns_since(&self, len: usize) -> Vec<Turn> {
        self.history.iter().skip(len).cloned().collect()
    }

    /// Drop analysis results that no longer describe the current metrics
    pub fn invalidate_analysis(&mut self) {
        self.validation_status = ValidationStatus::Unset;
        self.prediction = None;
        self.advice = None;
    }
}
