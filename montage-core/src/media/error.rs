use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::project::ProjectError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("project error: {0}")]
    Project(#[from] ProjectError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;
