//! LLM provider abstraction
//!
//! Used by the extraction capability to read metrics out of free text and
//! draft the assistant's reply.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAIService, DEFAULT_BASE_URL};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Base URL used with a GitHub token when no `LLM_BASE_URL` is set
pub const GITHUB_MODELS_URL: &str = "https://models.inference.ai.azure.com";

pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// LLM provider configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    /// `OPENAI_API_KEY` wins over `GITHUB_TOKEN`; the latter defaults the
    /// base URL to GitHub Models.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (api_key, default_base) = match (non_empty("OPENAI_API_KEY"), non_empty("GITHUB_TOKEN")) {
            (Some(key), _) => (Some(key), None),
            (None, Some(token)) => (Some(token), Some(GITHUB_MODELS_URL.to_string())),
            (None, None) => (None, None),
        };

        Self {
            api_key,
            base_url: non_empty("LLM_BASE_URL").or(default_base),
            model: non_empty("LLM_MODEL"),
        }
    }

    /// Build the logging-wrapped service, None when no key is configured
    pub fn service(&self) -> Result<Option<Arc<dyn LlmService>>, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };
        let inner = OpenAIService::new(
            api_key.clone(),
            self.model.as_deref().unwrap_or(DEFAULT_MODEL),
            self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
        )?;
        Ok(Some(Arc::new(LoggingService::new(Arc::new(inner)))))
    }
}

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    transient = e.kind.is_transient(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
