use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("encode failed for {platform}: {detail}")]
    Encode { platform: String, detail: String },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
