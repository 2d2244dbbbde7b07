//! Metric extraction from user utterances

use super::CapabilityError;
use crate::llm::{LlmMessage, LlmRequest, LlmService, SystemContent};
use crate::runtime::{Extraction, Extractor};
use crate::state_machine::{MetricField, Metrics, Role, Turn};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Most recent turns sent along for conversational context
const CONTEXT_TURNS: usize = 12;

const EXTRACTION_PROMPT: &str = r#"You are a helpful, empathetic medical assistant collecting data for a diabetes risk assessment.

Read the user's latest message and reply with a single JSON object:
{
  "age": number or null,
  "glucose": number or null,
  "bmi": number or null,
  "pregnancies": number or null,
  "blood_pressure": number or null,
  "skin_thickness": number or null,
  "insulin": number or null,
  "pedigree": number or null,
  "reply": "what you say back to the user"
}

Only fill a field when the latest message states that value. Use null otherwise.

For the reply:
1. Respond to the user's message naturally (chat, answer questions, or empathize).
2. If the user is just greeting you, be warm and explain you can help assess diabetes risk.
3. If data is missing, ask for ONE missing piece of information at a time.
4. If all required data is present, tell them you are ready to perform the clinical analysis."#;

// ============================================================================
// LLM extractor
// ============================================================================

/// Extraction through an OpenAI-compatible chat model in JSON mode
pub struct LlmExtractor {
    llm: Arc<dyn LlmService>,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self {
            llm,
            timeout: EXTRACTION_TIMEOUT,
        }
    }

    #[allow(dead_code)] // Used in tests
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(text: &str, history: &[Turn], current: &Metrics) -> LlmRequest {
        let current_json =
            serde_json::to_string(current).unwrap_or_else(|_| "{}".to_string());
        let missing = current
            .missing_required()
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let context = format!(
            "CURRENT DATA: {current_json}\nMISSING DATA: [{missing}]"
        );

        let start = history.len().saturating_sub(CONTEXT_TURNS);
        let mut messages: Vec<LlmMessage> = history
            .iter()
            .skip(start)
            .map(|turn| match turn.role {
                Role::User => LlmMessage::user(&turn.text),
                Role::Assistant => LlmMessage::assistant(&turn.text),
            })
            .collect();

        // The caller normally records the utterance before extracting
        let already_last = history
            .last()
            .is_some_and(|t| t.role == Role::User && t.text == text);
        if !already_last {
            messages.push(LlmMessage::user(text));
        }

        LlmRequest {
            system: vec![
                SystemContent::new(EXTRACTION_PROMPT),
                SystemContent::new(context),
            ],
            messages,
            max_tokens: Some(600),
            temperature: Some(0.3),
            json_mode: true,
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(
        &self,
        text: &str,
        history: &[Turn],
        current: &Metrics,
    ) -> Result<Extraction, CapabilityError> {
        let request = Self::build_request(text, history, current);

        let response = timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| CapabilityError::timeout("Extraction timed out"))??;

        parse_extraction(&response.text)
    }
}

/// Parse the model's JSON answer. Fields that are null, missing or not
/// numeric are treated as not mentioned.
pub(crate) fn parse_extraction(raw: &str) -> Result<Extraction, CapabilityError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CapabilityError::malformed(format!("Extraction was not JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(CapabilityError::malformed("Extraction was not a JSON object"));
    };

    let mut metrics = Metrics::default();
    for field in MetricField::ALL {
        if let Some(number) = object.get(field.as_str()).and_then(numeric) {
            metrics.set(field, number);
        }
    }

    let reply = object
        .get("reply")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(Extraction { metrics, reply })
}

fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============================================================================
// Rule extractor
// ============================================================================

const NUMBER: &str = r"(-?\d+(?:\.\d+)?)";

/// Filler allowed between a keyword and its value, e.g. "glucose level is 130"
const FILLER: &str = r"(?:\s+(?:level|levels|reading|is|of|at|was|now|actually|around|about))*\s*[:=]?\s*";

fn keyword_pattern(keywords: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{keywords}){FILLER}{NUMBER}"))
        .expect("metric pattern is a valid regex")
}

static PATTERNS: LazyLock<Vec<(MetricField, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            MetricField::Age,
            vec![
                keyword_pattern("age|aged|i'?m|i am"),
                Regex::new(&format!(r"(?i){NUMBER}\s*(?:years?|yrs?)\s*old\b"))
                    .expect("age pattern is a valid regex"),
            ],
        ),
        (
            MetricField::Glucose,
            vec![keyword_pattern("glucose|blood sugar|sugar")],
        ),
        (MetricField::Bmi, vec![keyword_pattern("bmi|body mass index")]),
        (
            MetricField::BloodPressure,
            vec![keyword_pattern("blood pressure|bp")],
        ),
        (MetricField::Insulin, vec![keyword_pattern("insulin")]),
        (
            MetricField::SkinThickness,
            vec![keyword_pattern("skin thickness|skinfold|skin fold")],
        ),
        (
            MetricField::Pregnancies,
            vec![
                keyword_pattern("pregnancies|pregnancy count"),
                Regex::new(&format!(r"(?i){NUMBER}\s*(?:pregnancies|pregnancy)\b"))
                    .expect("pregnancy pattern is a valid regex"),
            ],
        ),
        (
            MetricField::Pedigree,
            vec![keyword_pattern("pedigree|diabetes pedigree function|dpf")],
        ),
    ]
});

/// Deterministic extractor used when no LLM is configured.
///
/// Recognizes "I'm 45, glucose 130, BMI 29" style statements. It never
/// writes a reply, so the Extract step composes one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleExtractor;

impl RuleExtractor {
    pub fn parse(text: &str) -> Metrics {
        let mut metrics = Metrics::default();
        for (field, patterns) in PATTERNS.iter() {
            let value = patterns
                .iter()
                .filter_map(|re| re.captures(text))
                .filter_map(|caps| caps.get(1))
                .find_map(|m| m.as_str().parse::<f64>().ok());
            if let Some(value) = value {
                metrics.set(*field, value);
            }
        }
        metrics
    }
}

#[async_trait]
impl Extractor for RuleExtractor {
    async fn extract(
        &self,
        text: &str,
        _history: &[Turn],
        _current: &Metrics,
    ) -> Result<Extraction, CapabilityError> {
        Ok(Extraction {
            metrics: Self::parse(text),
            reply: None,
        })
    }
}
