mod error;
mod models;
mod store;
mod tracker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::MontageConfig;
use crate::executor::{EditExecutor, StagingPaths};
use crate::plan::PromptInterpreter;
use crate::project::{Project, SqliteProjectStore};
use crate::render::{Platform, PlatformRenderer};
use crate::tool::{CommandExecutor, SystemCommandExecutor};

pub use error::{JobError, JobResult};
pub use models::{AiAnalysis, ArtifactRecord, Job, JobStatus};
pub use store::{SqliteJobStore, SqliteJobStoreBuilder};
pub use tracker::StatusTracker;

const DATABASE_FILE: &str = "montage.db";
const PROGRESS_ANALYSIS_START: u8 = 5;
const PROGRESS_EXECUTION_START: u8 = 20;
const PROGRESS_RENDER_START: u8 = 60;
const PROGRESS_RENDER_SPAN: u8 = 40;

/// Everything a caller sees about one job: the tracked row, the analysis
/// summary once it exists, and the artifacts produced so far.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: Job,
    pub analysis: Option<AiAnalysis>,
    pub artifacts: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub project_id: String,
    pub jobs_removed: usize,
    pub project_removed: bool,
}

/// Owns the full pipeline: prompt interpretation, edit execution and
/// per-platform rendering, with one background task per job. Both stores
/// share a single database file.
pub struct Orchestrator {
    config: Arc<MontageConfig>,
    projects: SqliteProjectStore,
    jobs: SqliteJobStore,
    interpreter: PromptInterpreter,
    executor: EditExecutor,
    renderer: PlatformRenderer,
    stall_timeout: Duration,
}

impl Orchestrator {
    pub fn new(config: Arc<MontageConfig>) -> JobResult<Self> {
        Self::with_executor(config, Arc::new(SystemCommandExecutor))
    }

    pub fn with_executor(
        config: Arc<MontageConfig>,
        tools: Arc<dyn CommandExecutor>,
    ) -> JobResult<Self> {
        let data_dir = config.resolve_path(&config.paths.data_dir);
        std::fs::create_dir_all(&data_dir).map_err(|source| JobError::Io {
            source,
            path: data_dir.clone(),
        })?;
        let db_path = data_dir.join(DATABASE_FILE);
        let projects = SqliteProjectStore::new(&db_path)?;
        projects.initialize()?;
        let jobs = SqliteJobStore::new(&db_path)?;
        jobs.initialize()?;

        let interpreter = PromptInterpreter::new(Arc::clone(&config), Arc::clone(&tools));
        let executor = EditExecutor::new(Arc::clone(&config));
        let renderer = PlatformRenderer::with_executor(Arc::clone(&config), tools);
        let stall_timeout = Duration::from_secs(config.jobs.stall_timeout_seconds);
        Ok(Self {
            config,
            projects,
            jobs,
            interpreter,
            executor,
            renderer,
            stall_timeout,
        })
    }

    pub fn project_store(&self) -> &SqliteProjectStore {
        &self.projects
    }

    pub fn job_store(&self) -> &SqliteJobStore {
        &self.jobs
    }

    /// Queues a job and spawns its pipeline. A project with a live job gets
    /// that job back instead of a second run.
    pub fn start(self: &Arc<Self>, project_id: &str, prompt: &str) -> JobResult<Job> {
        let project = self.projects.fetch_project(project_id)?;
        if let Some(active) = self.jobs.fetch_active_for_project(&project.project_id)? {
            info!(
                target: "montage::job",
                job_id = %active.job_id,
                project_id = %project.project_id,
                "returning already active job"
            );
            return Ok(active);
        }

        let job = Job::new(&project.project_id);
        self.jobs.insert_job(&job)?;
        info!(
            target: "montage::job",
            job_id = %job.job_id,
            project_id = %project.project_id,
            "job queued"
        );

        let runner = Arc::clone(self);
        let spawned = job.clone();
        let prompt = prompt.to_string();
        let pipeline = tokio::spawn(async move { runner.run_job(spawned, prompt).await });
        let watcher = Arc::clone(self);
        let watched = job.job_id.clone();
        tokio::spawn(async move { watcher.watch_for_stall(watched, pipeline).await });
        Ok(job)
    }

    async fn run_job(self: Arc<Self>, job: Job, prompt: String) {
        let tracker = StatusTracker::new(self.jobs.clone(), job.job_id.clone());
        if let Err(err) = self.run_pipeline(&job, &prompt, &tracker).await {
            error!(
                target: "montage::job",
                job_id = %job.job_id,
                error = %err,
                "pipeline failed"
            );
            // the watchdog may have already moved the job to failed
            if let Err(write_err) = tracker.fail(&err.to_string()) {
                warn!(
                    target: "montage::job",
                    job_id = %job.job_id,
                    error = %write_err,
                    "failure not recorded"
                );
            }
        }
    }

    async fn run_pipeline(
        &self,
        job: &Job,
        prompt: &str,
        tracker: &StatusTracker,
    ) -> JobResult<()> {
        let project = self.projects.fetch_project(&job.project_id)?;
        tracker.advance(JobStatus::Analyzing, PROGRESS_ANALYSIS_START)?;

        let plan = self.interpreter.interpret(&project, prompt).await?;
        self.jobs.insert_plan(&plan)?;
        self.jobs.set_analysis(
            &job.job_id,
            plan.mode.as_str(),
            plan.detected_emotion.as_str(),
            plan.operations_count() as u32,
        )?;
        tracker.advance(JobStatus::Processing, PROGRESS_EXECUTION_START)?;

        let job_dir = self.job_dir(&job.project_id, &job.job_id);
        let staging = StagingPaths::new(job_dir.join("staging"));
        let execute_tracker = tracker.clone();
        let on_execute = move |value: u8| {
            if let Err(err) = execute_tracker.advance(JobStatus::Processing, value) {
                warn!(
                    target: "montage::job",
                    job_id = %execute_tracker.job_id(),
                    error = %err,
                    "execution progress dropped"
                );
            }
        };
        let outcome = self
            .executor
            .execute(&project, &plan, &staging, &on_execute)
            .await?;
        tracker.advance(JobStatus::Processing, PROGRESS_RENDER_START)?;

        let render_tracker = tracker.clone();
        let on_render = move |done: usize, total: usize| {
            if let Err(err) =
                render_tracker.advance(JobStatus::Processing, render_progress(done, total))
            {
                warn!(
                    target: "montage::job",
                    job_id = %render_tracker.job_id(),
                    error = %err,
                    "render progress dropped"
                );
            }
        };
        let results = self
            .renderer
            .render_all(&project, &outcome, &job_dir, &on_render)
            .await?;

        let mut failed = Vec::new();
        for entry in &results {
            match &entry.result {
                Ok(artifact) => {
                    self.jobs.upsert_artifact(&ArtifactRecord {
                        job_id: job.job_id.clone(),
                        platform: artifact.platform,
                        profile: artifact.profile.clone(),
                        output_path: artifact.output_path.clone(),
                        preview_path: Some(artifact.preview_path.clone()),
                        size_bytes: artifact.size_bytes,
                        checksum: Some(artifact.checksum.clone()),
                        ready: true,
                        created_at: Utc::now(),
                    })?;
                }
                Err(err) => failed.push(format!("{}: {err}", entry.platform)),
            }
        }

        if failed.is_empty() {
            tracker.complete()?;
        } else {
            // artifacts that did render stay downloadable on the failed job
            tracker.fail(&format!("render failed for {}", failed.join("; ")))?;
        }
        Ok(())
    }

    /// Fails jobs whose row stops moving. The clock is `updated_at`, which
    /// every progress write refreshes.
    async fn watch_for_stall(self: Arc<Self>, job_id: String, pipeline: JoinHandle<()>) {
        let poll = Duration::from_secs((self.stall_timeout.as_secs() / 4).max(1));
        loop {
            tokio::time::sleep(poll).await;
            let job = match self.jobs.fetch_job(&job_id) {
                Ok(job) => job,
                Err(err) => {
                    warn!(
                        target: "montage::job",
                        job_id = %job_id,
                        error = %err,
                        "watchdog could not read job"
                    );
                    return;
                }
            };
            if job.status.is_terminal() {
                return;
            }
            let age = Utc::now().signed_duration_since(job.updated_at);
            if age.num_seconds() >= self.stall_timeout.as_secs() as i64 {
                warn!(
                    target: "montage::job",
                    job_id = %job_id,
                    stalled_seconds = age.num_seconds(),
                    "job stalled, aborting pipeline"
                );
                pipeline.abort();
                if let Err(err) = self.jobs.update_status(
                    &job_id,
                    JobStatus::Failed,
                    0,
                    Some("job stalled without progress"),
                ) {
                    warn!(
                        target: "montage::job",
                        job_id = %job_id,
                        error = %err,
                        "stall not recorded"
                    );
                }
                return;
            }
        }
    }

    pub fn status(&self, job_id: &str) -> JobResult<JobReport> {
        let job = self.jobs.fetch_job(job_id)?;
        let artifacts = self.jobs.list_artifacts(job_id)?;
        let analysis = match (job.mode, job.detected_emotion, job.operations_count) {
            (Some(mode), Some(emotion), Some(count)) => self
                .jobs
                .fetch_latest_plan(&job.project_id)?
                .map(|plan| AiAnalysis {
                    plan_id: plan.plan_id,
                    mode,
                    detected_emotion: emotion,
                    operations_count: count,
                }),
            _ => None,
        };
        Ok(JobReport {
            job,
            analysis,
            artifacts,
        })
    }

    /// Project-keyed snapshot: the live job when one exists, else the most
    /// recent run.
    pub fn status_for_project(&self, project_id: &str) -> JobResult<JobReport> {
        let project = self.projects.fetch_project(project_id)?;
        let job = match self.jobs.fetch_active_for_project(&project.project_id)? {
            Some(job) => job,
            None => self
                .jobs
                .fetch_latest_for_project(&project.project_id)?
                .ok_or_else(|| JobError::NotFound {
                    job_id: project_id.to_string(),
                })?,
        };
        self.status(&job.job_id)
    }

    pub fn download(&self, job_id: &str, platform: Platform) -> JobResult<ArtifactRecord> {
        let artifacts = self.jobs.list_artifacts(job_id)?;
        if artifacts.is_empty() {
            self.jobs.fetch_job(job_id)?;
        }
        artifacts
            .into_iter()
            .find(|artifact| artifact.platform == platform && artifact.ready)
            .ok_or_else(|| JobError::ArtifactNotReady {
                job_id: job_id.to_string(),
                platform: platform.to_string(),
            })
    }

    pub fn preview(&self, job_id: &str) -> JobResult<PathBuf> {
        let artifacts = self.jobs.list_artifacts(job_id)?;
        if artifacts.is_empty() {
            self.jobs.fetch_job(job_id)?;
        }
        artifacts
            .into_iter()
            .filter(|artifact| artifact.ready)
            .find_map(|artifact| artifact.preview_path)
            .ok_or_else(|| JobError::ArtifactNotReady {
                job_id: job_id.to_string(),
                platform: "preview".to_string(),
            })
    }

    /// Removes the project row, its jobs, plans, artifacts, and both the
    /// media and output directories. Refused while a run is live.
    pub async fn delete_project(&self, project_id: &str) -> JobResult<DeleteOutcome> {
        let project = self.projects.fetch_project(project_id)?;
        if let Some(active) = self.jobs.fetch_active_for_project(project_id)? {
            return Err(JobError::JobActive {
                project_id: project_id.to_string(),
                job_id: active.job_id,
            });
        }
        let jobs_removed = self.jobs.delete_for_project(project_id)?;
        let project_removed = self.projects.delete_project(project_id)?;

        let media_dir = self
            .config
            .resolve_path(&self.config.paths.media_dir)
            .join(project_id);
        let output_dir = self
            .config
            .resolve_path(&self.config.paths.output_dir)
            .join(project_id);
        remove_dir_if_present(&media_dir).await?;
        remove_dir_if_present(&output_dir).await?;

        info!(
            target: "montage::job",
            project_id = %project.project_id,
            original_name = %project.original_name,
            jobs_removed,
            "project deleted"
        );
        Ok(DeleteOutcome {
            project_id: project.project_id,
            jobs_removed,
            project_removed,
        })
    }

    pub fn list_jobs(&self, limit: usize) -> JobResult<Vec<Job>> {
        self.jobs.list_jobs(limit)
    }

    pub fn list_projects(&self, limit: usize) -> JobResult<Vec<Project>> {
        Ok(self.projects.list_projects(limit)?)
    }

    fn job_dir(&self, project_id: &str, job_id: &str) -> PathBuf {
        self.config
            .resolve_path(&self.config.paths.output_dir)
            .join(project_id)
            .join(job_id)
    }
}

fn render_progress(done: usize, total: usize) -> u8 {
    let total = total.max(1) as u64;
    let value =
        u64::from(PROGRESS_RENDER_START) + u64::from(PROGRESS_RENDER_SPAN) * done as u64 / total;
    value.min(99) as u8
}

async fn remove_dir_if_present(path: &Path) -> JobResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(JobError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}
