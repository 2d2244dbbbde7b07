//! Risk classifier backed by an exported logistic-regression artifact

use super::CapabilityError;
use crate::runtime::Classifier;
use crate::state_machine::{FeatureVector, Prediction, RiskLabel};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::state_machine::metrics::FEATURE_COUNT;

fn default_threshold() -> f64 {
    0.5
}

/// Standard scaler plus logistic regression, as exported from training.
///
/// Arrays are indexed by the classifier feature order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelArtifact {
    #[serde(default)]
    pub model_id: Option<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl ModelArtifact {
    fn check(&self) -> Result<(), String> {
        for (name, values) in [
            ("mean", &self.mean),
            ("scale", &self.scale),
            ("coefficients", &self.coefficients),
        ] {
            if values.len() != FEATURE_COUNT {
                return Err(format!(
                    "{name} has {} values, expected {FEATURE_COUNT}",
                    values.len()
                ));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(format!("{name} contains a non-finite value"));
            }
        }
        if self.scale.iter().any(|s| s.abs() < f64::EPSILON) {
            return Err("scale contains a zero entry".to_string());
        }
        if !self.intercept.is_finite() {
            return Err("intercept is not finite".to_string());
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold {} is outside [0, 1]", self.threshold));
        }
        Ok(())
    }
}

/// Evaluates a `ModelArtifact` in process
#[derive(Debug, Clone)]
pub struct LinearModelClassifier {
    artifact: ModelArtifact,
    model_id: String,
}

impl LinearModelClassifier {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, CapabilityError> {
        artifact
            .check()
            .map_err(|e| CapabilityError::malformed(format!("Invalid model artifact: {e}")))?;
        let model_id = artifact
            .model_id
            .clone()
            .unwrap_or_else(|| "logistic-regression".to_string());
        Ok(Self { artifact, model_id })
    }

    /// Load the artifact JSON from disk
    pub fn load(path: &Path) -> Result<Self, CapabilityError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CapabilityError::unavailable(format!("Cannot read {}: {e}", path.display()))
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| {
            CapabilityError::malformed(format!("Cannot parse {}: {e}", path.display()))
        })?;
        Self::from_artifact(artifact)
    }

    /// Probability of the positive class
    pub fn probability(&self, features: &FeatureVector) -> f64 {
        let a = &self.artifact;
        let logit = features
            .as_slice()
            .iter()
            .zip(&a.mean)
            .zip(&a.scale)
            .zip(&a.coefficients)
            .fold(a.intercept, |acc, (((x, mean), scale), coef)| {
                acc + coef * (x - mean) / scale
            });
        1.0 / (1.0 + (-logit).exp())
    }
}

#[async_trait]
impl Classifier for LinearModelClassifier {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, CapabilityError> {
        if features.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(CapabilityError::malformed("Feature vector has non-finite values"));
        }
        let probability = self.probability(features);
        let label = if probability >= self.artifact.threshold {
            RiskLabel::HighRisk
        } else {
            RiskLabel::LowRisk
        };
        Ok(Prediction::new(label, probability))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Stand-in when no model artifact is configured; every prediction fails
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Classifier for UnavailableClassifier {
    async fn predict(&self, _features: &FeatureVector) -> Result<Prediction, CapabilityError> {
        Err(CapabilityError::unavailable(self.reason.clone()))
    }

    fn model_id(&self) -> &str {
        "unavailable"
    }
}
