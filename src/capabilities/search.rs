//! Best-effort retrieval over the DuckDuckGo Instant Answer API

use super::CapabilityError;
use crate::runtime::Retriever;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com/";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESULTS: usize = 5;

pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .user_agent(concat!("triage_graph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CapabilityError::unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Retriever for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::network(format!(
                "Search returned HTTP {status}"
            )));
        }

        let body = response.text().await?;
        let answer: InstantAnswer = serde_json::from_str(&body)
            .map_err(|e| CapabilityError::malformed(format!("Unexpected search response: {e}")))?;

        summarize(&answer).ok_or_else(|| {
            tracing::debug!(query, "Search returned no usable text");
            CapabilityError::malformed("Search returned no results")
        })
    }
}

// ============================================================================
// Response shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default)]
    abstract_source: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<&'a str>) {
    for topic in topics {
        if out.len() >= MAX_RESULTS {
            return;
        }
        match topic {
            RelatedTopic::Topic { text } if !text.trim().is_empty() => out.push(text.trim()),
            RelatedTopic::Topic { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

/// Abstract paragraph followed by up to `MAX_RESULTS` bullet points
fn summarize(answer: &InstantAnswer) -> Option<String> {
    let mut sections = Vec::new();

    let abstract_text = answer.abstract_text.trim();
    if !abstract_text.is_empty() {
        if answer.abstract_source.is_empty() {
            sections.push(abstract_text.to_string());
        } else {
            sections.push(format!("{abstract_text} (Source: {})", answer.abstract_source));
        }
    }

    let mut topics = Vec::new();
    collect_topics(&answer.related_topics, &mut topics);
    if !topics.is_empty() {
        sections.push(
            topics
                .iter()
                .map(|t| format!("- {t}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}
