use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::JobsSection;
use crate::plan::{CaptionCue, CaptionStyle, MusicMood, TimeRange};

use super::error::{ExecutorError, ExecutorResult};

/// Scratch layout for one job. Everything under `root` is disposable once
/// the render outputs are in place.
#[derive(Debug, Clone)]
pub struct StagingPaths {
    pub root: PathBuf,
    pub cuts_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl StagingPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cuts_dir: root.join("cuts"),
            audio_dir: root.join("audio"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    pub async fn prepare(&self) -> ExecutorResult<()> {
        for dir in [&self.cuts_dir, &self.audio_dir, &self.logs_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ExecutorError::Io {
                    source,
                    path: dir.clone(),
                })?;
        }
        Ok(())
    }

    pub fn decision_path(&self) -> PathBuf {
        self.logs_dir.join("edit_decision.json")
    }
}

/// Linear backoff between the configured bounds. Attempts are 1-based.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(jobs: &JobsSection) -> Self {
        Self {
            max_attempts: jobs.max_attempts.max(1),
            min_delay: Duration::from_secs(u64::from(jobs.retry_delay_seconds[0])),
            max_delay: Duration::from_secs(u64::from(jobs.retry_delay_seconds[1])),
        }
    }

    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if self.max_attempts <= 1 || attempt <= 1 {
            return self.min_delay;
        }
        let span = self.max_delay.saturating_sub(self.min_delay);
        let steps = self.max_attempts - 1;
        let position = attempt.min(self.max_attempts) - 1;
        self.min_delay + span.mul_f64(f64::from(position) / f64::from(steps))
    }
}

/// Music placement settled by the executor, consumed by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicBed {
    pub mood: MusicMood,
    pub volume: f32,
    pub duck: Vec<TimeRange>,
}

/// Caption track after validation, in final timeline coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub style: CaptionStyle,
    pub sync: bool,
    pub cues: Vec<CaptionCue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedStep {
    pub kind: String,
    pub detail: String,
}

/// Audit record written next to the staging logs after execution. Mirrors
/// what actually happened, not what the plan asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditDecision {
    pub plan_id: String,
    pub project_id: String,
    pub source_duration: f64,
    pub final_duration: f64,
    pub removed_seconds: f64,
    pub applied: Vec<AppliedStep>,
    pub created_at: DateTime<Utc>,
}

impl EditDecision {
    pub async fn load(path: &Path) -> ExecutorResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ExecutorError::Io {
                source,
                path: path.to_path_buf(),
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}
