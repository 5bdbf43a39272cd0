use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("analysis tool failed: {0}")]
    Tool(String),
    #[error("plan integrity violated: {0}")]
    Integrity(String),
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
