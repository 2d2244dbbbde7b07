//! Capability error types

use crate::llm::{LlmError, LlmErrorKind};
use thiserror::Error;

/// Failure of an external capability (extraction, classifier, retrieval)
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Malformed, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Unavailable, message)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// The call did not finish in time
    Timeout,
    /// Transport or upstream service failure
    Network,
    /// The service answered with something we could not use
    Malformed,
    /// The capability is not configured or refused the request
    Unavailable,
}

impl std::fmt::Display for CapabilityErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CapabilityErrorKind::Timeout => "timeout",
            CapabilityErrorKind::Network => "network",
            CapabilityErrorKind::Malformed => "malformed",
            CapabilityErrorKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

impl From<LlmError> for CapabilityError {
    fn from(e: LlmError) -> Self {
        let kind = match e.kind {
            LlmErrorKind::Network | LlmErrorKind::RateLimit | LlmErrorKind::ServerError => {
                CapabilityErrorKind::Network
            }
            LlmErrorKind::Auth | LlmErrorKind::InvalidRequest => CapabilityErrorKind::Unavailable,
            LlmErrorKind::Unknown => CapabilityErrorKind::Malformed,
        };
        Self::new(kind, e.message)
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {e}"))
        } else if e.is_decode() {
            Self::malformed(format!("Failed to decode response: {e}"))
        } else {
            Self::network(format!("Request failed: {e}"))
        }
    }
}
