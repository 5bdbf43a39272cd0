use std::path::PathBuf;

use thiserror::Error;

use crate::render::UnknownPlatform;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("project {project_id} not found")]
    NotFound { project_id: String },
    #[error("unknown platform in stored project: {0}")]
    Platform(#[from] UnknownPlatform),
    #[error("project store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type ProjectResult<T> = std::result::Result<T, ProjectError>;
