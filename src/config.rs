//! Startup configuration from environment variables

use crate::capabilities::DEFAULT_SEARCH_URL;
use crate::llm::LlmConfig;
use crate::state_machine::ValidationRanges;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TRIAGE_PORT is not a valid port: {0}")]
    InvalidPort(String),
    #[error("Cannot read ranges file {}: {source}", .path.display())]
    RangesRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot parse ranges file {}: {source}", .path.display())]
    RangesParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid validation ranges: {0}")]
    InvalidRanges(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    /// Classifier artifact; None leaves prediction unavailable
    pub model_path: Option<PathBuf>,
    pub ranges: ValidationRanges,
    pub search_url: String,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("TRIAGE_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".triage-graph").join("sessions.db")
            },
            PathBuf::from,
        );

        let port = match lookup("TRIAGE_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        let ranges = match lookup("TRIAGE_RANGES_PATH") {
            Some(path) => load_ranges(Path::new(&path))?,
            None => ValidationRanges::default(),
        };

        Ok(Self {
            db_path,
            port,
            model_path: lookup("TRIAGE_MODEL_PATH").map(PathBuf::from),
            ranges,
            search_url: lookup("TRIAGE_SEARCH_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            llm: LlmConfig::from_lookup(&lookup),
        })
    }
}

/// Read a JSON range table. Fields left out keep their stock bounds.
pub fn load_ranges(path: &Path) -> Result<ValidationRanges, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::RangesRead {
        path: path.to_path_buf(),
        source,
    })?;
    let ranges: ValidationRanges =
        serde_json::from_str(&raw).map_err(|source| ConfigError::RangesParse {
            path: path.to_path_buf(),
            source,
        })?;
    ranges.check().map_err(ConfigError::InvalidRanges)?;
    Ok(ranges)
}
