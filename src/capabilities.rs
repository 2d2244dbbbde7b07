//! External collaborators behind the runtime traits
//!
//! - extraction of metrics from free text (LLM or rule based)
//! - the risk classifier evaluated from an exported model artifact
//! - best-effort web retrieval for lifestyle advice

mod classifier;
mod error;
mod extractor;
mod search;

pub use classifier::{LinearModelClassifier, ModelArtifact, UnavailableClassifier};
pub use error::{CapabilityError, CapabilityErrorKind};
pub use extractor::{LlmExtractor, RuleExtractor};
pub use search::{DuckDuckGoSearch, DEFAULT_SEARCH_URL};
