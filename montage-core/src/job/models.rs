use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::{EmotionLabel, PlanMode};
use crate::render::Platform;

use super::error::{JobError, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Analyzing,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward-only lifecycle. Any non-terminal status may fail, nothing
    /// leaves a terminal status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Analyzing)
                | (JobStatus::Analyzing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (_, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(JobStatus::Queued),
            "analyzing" => Ok(JobStatus::Analyzing),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Tracked state of one editing run. Progress only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub project_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub mode: Option<PlanMode>,
    pub detected_emotion: Option<EmotionLabel>,
    pub operations_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: format!("job-{}", Uuid::new_v4().simple()),
            project_id: project_id.into(),
            status: JobStatus::Queued,
            progress: 0,
            error: None,
            mode: None,
            detected_emotion: None,
            operations_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row<'_>) -> JobResult<Self> {
        let status_raw: String = row.get("status")?;
        let status = status_raw
            .parse()
            .map_err(|_| JobError::UnknownStatus(status_raw.clone()))?;
        let mode: Option<String> = row.get("mode")?;
        let emotion: Option<String> = row.get("detected_emotion")?;
        let operations_count: Option<i64> = row.get("operations_count")?;
        Ok(Self {
            job_id: row.get("job_id")?,
            project_id: row.get("project_id")?,
            status,
            progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
            error: row.get("error")?,
            mode: mode.and_then(|value| value.parse().ok()),
            detected_emotion: emotion.and_then(|value| value.parse().ok()),
            operations_count: operations_count.map(|value| value.max(0) as u32),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Analysis summary surfaced alongside job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub plan_id: String,
    pub mode: PlanMode,
    pub detected_emotion: EmotionLabel,
    pub operations_count: u32,
}

/// Persisted record of one rendered output. `ready` flips only after the
/// file, checksum and preview all exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub job_id: String,
    pub platform: Platform,
    pub profile: String,
    pub output_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub checksum: Option<String>,
    pub ready: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn from_row(row: &Row<'_>) -> JobResult<Self> {
        let platform_raw: String = row.get("platform")?;
        let platform = platform_raw
            .parse::<Platform>()
            .map_err(|err| JobError::Project(crate::project::ProjectError::Platform(err)))?;
        let preview: Option<String> = row.get("preview_path")?;
        Ok(Self {
            job_id: row.get("job_id")?,
            platform,
            profile: row.get("profile")?,
            output_path: PathBuf::from(row.get::<_, String>("output_path")?),
            preview_path: preview.map(PathBuf::from),
            size_bytes: row.get::<_, i64>("size_bytes")?.max(0) as u64,
            checksum: row.get("checksum")?,
            ready: row.get::<_, i64>("ready")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}
