use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::media::MediaError;
use crate::plan::PlanError;
use crate::project::ProjectError;
use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("job not found: {job_id}")]
    NotFound { job_id: String },
    #[error("artifact not ready for {platform} on job {job_id}")]
    ArtifactNotReady { job_id: String, platform: String },
    #[error("project {project_id} still has a live job: {job_id}")]
    JobActive { project_id: String, job_id: String },
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("unknown job status: {0}")]
    UnknownStatus(String),
    #[error("store path not configured")]
    MissingStore,
    #[error("cannot open database {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Execution(#[from] ExecutorError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub type JobResult<T> = std::result::Result<T, JobError>;
