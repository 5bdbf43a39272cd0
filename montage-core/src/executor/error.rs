use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("plan integrity violated: {0}")]
    PlanIntegrity(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
