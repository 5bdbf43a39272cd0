use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;

use montage_core::{
    load_montage_config, DeleteOutcome, JobReport, MediaIngestor, MontageConfig, Orchestrator,
    Platform,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] montage_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("authentication failed")]
    Authentication,
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error(transparent)]
    Platform(#[from] montage_core::render::UnknownPlatform),
    #[error(transparent)]
    Media(#[from] montage_core::MediaError),
    #[error(transparent)]
    Job(#[from] montage_core::JobError),
    #[error(transparent)]
    Project(#[from] montage_core::ProjectError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Montage command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to the main montage.toml
    #[arg(long, default_value = "configs/montage.toml")]
    pub config: PathBuf,
    /// Override for paths.data_dir
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Local authentication token (required when MONTAGECTL_TOKEN is set)
    #[arg(long)]
    pub token: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Registers an uploaded video as a new project
    Upload(UploadArgs),
    /// Starts the editing pipeline for a project
    Start(StartArgs),
    /// Shows a job with its analysis summary and artifacts
    Status(StatusArgs),
    /// Resolves the artifact for one platform
    Download(DownloadArgs),
    /// Resolves the preview image for a job
    Preview(PreviewArgs),
    /// Deletes a project, its jobs and every output
    Delete(DeleteArgs),
    /// Project listings
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Job listings
    #[command(subcommand)]
    Job(JobCommands),
    /// Runs integrity checks
    #[command(subcommand)]
    Health(HealthCommands),
    /// Backs up the montage database
    Backup(BackupArgs),
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Source media file
    #[arg(long)]
    pub source: PathBuf,
    /// Original file name, defaults to the source file name
    #[arg(long)]
    pub name: Option<String>,
    /// Target platforms, defaults to render.default_platforms
    #[arg(long, value_delimiter = ',')]
    pub platforms: Vec<String>,
    /// Editing prompt
    #[arg(long)]
    pub prompt: String,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Project identifier
    #[arg(long)]
    pub project: String,
    /// Editing prompt
    #[arg(long)]
    pub prompt: String,
    /// Return immediately instead of waiting for the job to finish
    #[arg(long, default_value_t = false)]
    pub detach: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job identifier
    #[arg(long, conflicts_with = "project", required_unless_present = "project")]
    pub job: Option<String>,
    /// Project identifier, resolves the newest job
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Job identifier
    #[arg(long)]
    pub job: String,
    /// Platform name
    #[arg(long)]
    pub platform: String,
    /// Copy the artifact to this path
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Job identifier
    #[arg(long)]
    pub job: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Project identifier
    #[arg(long)]
    pub project: String,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Lists registered projects
    List(ListArgs),
}

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Lists tracked jobs
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Maximum number of rows
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Runs the basic checks
    Check,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Destination file
    #[arg(long)]
    pub destination: PathBuf,
    /// Write a gzipped SQL dump instead of a database snapshot
    #[arg(long, default_value_t = false)]
    pub dump: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    enforce_token(&cli)?;
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Upload(args) => {
            let project = context.upload(args).await?;
            render(&project, cli.format)?;
        }
        Commands::Start(args) => {
            let report = context.start(args).await?;
            render(&report, cli.format)?;
        }
        Commands::Status(args) => {
            let report = context.status(args)?;
            render(&report, cli.format)?;
        }
        Commands::Download(args) => {
            let artifact = context.download(args).await?;
            render(&artifact, cli.format)?;
        }
        Commands::Preview(args) => {
            let preview = context.preview(args)?;
            render(&preview, cli.format)?;
        }
        Commands::Delete(args) => {
            let outcome = context.delete(args).await?;
            render(&outcome, cli.format)?;
        }
        Commands::Project(ProjectCommands::List(args)) => {
            let projects = context.project_list(args)?;
            render(&projects, cli.format)?;
        }
        Commands::Job(JobCommands::List(args)) => {
            let jobs = context.job_list(args)?;
            render(&jobs, cli.format)?;
        }
        Commands::Health(HealthCommands::Check) => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Backup(args) => {
            let backup = context.backup(args)?;
            render(&backup, cli.format)?;
        }
    }

    Ok(())
}

fn enforce_token(cli: &Cli) -> Result<()> {
    if let Ok(expected) = std::env::var("MONTAGECTL_TOKEN") {
        match &cli.token {
            Some(provided) if provided == &expected => Ok(()),
            _ => Err(AppError::Authentication),
        }
    } else {
        Ok(())
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

pub struct AppContext {
    config: Arc<MontageConfig>,
    orchestrator: Arc<Orchestrator>,
    config_path: PathBuf,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_montage_config(&cli.config)?;
        if let Some(data_dir) = &cli.data_dir {
            config.paths.data_dir = data_dir.display().to_string();
        }
        let config = Arc::new(config);
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config))?);
        Ok(Self {
            config,
            orchestrator,
            config_path: cli.config.clone(),
        })
    }

    async fn upload(&self, args: &UploadArgs) -> Result<ProjectView> {
        let ingestor = MediaIngestor::new(
            Arc::clone(&self.config),
            self.orchestrator.project_store().clone(),
        );
        let platforms = self.resolve_platforms(&args.platforms)?;
        let name = match &args.name {
            Some(name) => name.clone(),
            None => args
                .source
                .file_name()
                .map(|value| value.to_string_lossy().to_string())
                .ok_or_else(|| {
                    AppError::MissingResource("source path has no file name".to_string())
                })?,
        };
        let project = ingestor
            .ingest(&args.source, &name, &platforms, &args.prompt)
            .await?;
        Ok(ProjectView::from_project(&project))
    }

    fn resolve_platforms(&self, requested: &[String]) -> Result<Vec<Platform>> {
        let names = if requested.is_empty() {
            &self.config.render.default_platforms
        } else {
            requested
        };
        names
            .iter()
            .map(|name| Ok(name.parse::<Platform>()?))
            .collect()
    }

    async fn start(&self, args: &StartArgs) -> Result<JobReport> {
        let job = self.orchestrator.start(&args.project, &args.prompt)?;
        if args.detach {
            return Ok(self.orchestrator.status(&job.job_id)?);
        }
        // the stall watchdog guarantees this loop terminates
        loop {
            let report = self.orchestrator.status(&job.job_id)?;
            if report.job.status.is_terminal() {
                return Ok(report);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    fn status(&self, args: &StatusArgs) -> Result<JobReport> {
        match (&args.job, &args.project) {
            (Some(job), _) => Ok(self.orchestrator.status(job)?),
            (None, Some(project)) => Ok(self.orchestrator.status_for_project(project)?),
            (None, None) => Err(AppError::MissingResource(
                "a job or project identifier".to_string(),
            )),
        }
    }

    async fn download(&self, args: &DownloadArgs) -> Result<ArtifactView> {
        let platform = args.platform.parse::<Platform>()?;
        let artifact = self.orchestrator.download(&args.job, platform)?;
        if let Some(out) = &args.out {
            tokio::fs::copy(&artifact.output_path, out).await?;
        }
        Ok(ArtifactView {
            job_id: artifact.job_id,
            platform: artifact.platform.to_string(),
            profile: artifact.profile,
            output_path: artifact.output_path,
            preview_path: artifact.preview_path,
            size_bytes: artifact.size_bytes,
            checksum: artifact.checksum,
            copied_to: args.out.clone(),
        })
    }

    fn preview(&self, args: &PreviewArgs) -> Result<PreviewView> {
        let preview_path = self.orchestrator.preview(&args.job)?;
        Ok(PreviewView {
            job_id: args.job.clone(),
            preview_path,
        })
    }

    async fn delete(&self, args: &DeleteArgs) -> Result<DeleteOutcome> {
        Ok(self.orchestrator.delete_project(&args.project).await?)
    }

    fn project_list(&self, args: &ListArgs) -> Result<ProjectList> {
        let rows = self
            .orchestrator
            .list_projects(args.limit)?
            .iter()
            .map(ProjectView::from_project)
            .collect();
        Ok(ProjectList { rows })
    }

    fn job_list(&self, args: &ListArgs) -> Result<JobList> {
        let rows = self
            .orchestrator
            .list_jobs(args.limit)?
            .into_iter()
            .map(|job| JobView {
                job_id: job.job_id,
                project_id: job.project_id,
                status: job.status.to_string(),
                progress: job.progress,
                error: job.error,
                created_at: job.created_at.to_rfc3339(),
            })
            .collect();
        Ok(JobList { rows })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(check_path("montage.toml", &self.config_path));
        let db_path = self
            .config
            .resolve_path(&self.config.paths.data_dir)
            .join("montage.db");
        results.push(check_database("montage.db", &db_path));
        for (name, dir) in [
            ("media", &self.config.paths.media_dir),
            ("output", &self.config.paths.output_dir),
            ("music", &self.config.paths.music_dir),
            ("logs", &self.config.paths.logs_dir),
        ] {
            results.push(check_directory(name, &self.config.resolve_path(dir)));
        }
        results.push(check_encoder());
        results
    }

    fn backup(&self, args: &BackupArgs) -> Result<BackupView> {
        let kind = if args.dump {
            self.orchestrator
                .job_store()
                .export_backup(&args.destination)?;
            "sql-dump"
        } else {
            self.orchestrator.job_store().backup_to(&args.destination)?;
            "snapshot"
        };
        Ok(BackupView {
            destination: args.destination.clone(),
            kind: kind.to_string(),
        })
    }
}

fn check_path(name: &str, path: &Path) -> HealthEntry {
    if path.exists() {
        HealthEntry::ok(name, format!("{}", path.display()))
    } else {
        HealthEntry::error(name, format!("{} missing", path.display()))
    }
}

fn check_directory(name: &str, path: &Path) -> HealthEntry {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
        Ok(_) => HealthEntry::warn(name, format!("{} is not a directory", path.display())),
        Err(_) => HealthEntry::warn(name, format!("{} not found", path.display())),
    }
}

fn check_database(name: &str, path: &Path) -> HealthEntry {
    if !path.exists() {
        return HealthEntry::warn(name, format!("{} not found", path.display()));
    }
    match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => {
            let pragma: rusqlite::Result<String> =
                conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
            match pragma {
                Ok(result) if result.to_lowercase() == "ok" => {
                    HealthEntry::ok(name, "integrity ok".to_string())
                }
                Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                Err(err) => HealthEntry::warn(name, format!("error: {err}")),
            }
        }
        Err(err) => HealthEntry::error(name, format!("cannot open: {err}")),
    }
}

fn check_encoder() -> HealthEntry {
    let status = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(code) if code.success() => HealthEntry::ok("ffmpeg", "encoder available".to_string()),
        Ok(code) => HealthEntry::warn("ffmpeg", format!("exited with {code}")),
        Err(_) => HealthEntry::warn(
            "ffmpeg",
            "not installed, renders fall back to stub artifacts".to_string(),
        ),
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub project_id: String,
    pub original_name: String,
    pub container: Option<String>,
    pub size_bytes: u64,
    pub duration_seconds: Option<f64>,
    pub platforms: Vec<String>,
    pub created_at: String,
}

impl ProjectView {
    fn from_project(project: &montage_core::Project) -> Self {
        Self {
            project_id: project.project_id.clone(),
            original_name: project.original_name.clone(),
            container: project.container.clone(),
            size_bytes: project.size_bytes,
            duration_seconds: project.duration_seconds,
            platforms: project
                .platforms
                .iter()
                .map(|platform| platform.to_string())
                .collect(),
            created_at: project.created_at.to_rfc3339(),
        }
    }
}

impl DisplayFallback for ProjectView {
    fn display(&self) -> String {
        let duration = self
            .duration_seconds
            .map(|value| format!("{value:.1}s"))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} | {} | {} | dur={} | platforms={}",
            self.project_id,
            self.original_name,
            self.container.as_deref().unwrap_or("?"),
            duration,
            self.platforms.join(",")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectList {
    pub rows: Vec<ProjectView>,
}

impl DisplayFallback for ProjectList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "no projects found".to_string();
        }
        self.rows
            .iter()
            .map(|row| row.display())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub project_id: String,
    pub status: String,
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub rows: Vec<JobView>,
}

impl DisplayFallback for JobList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "no jobs found".to_string();
        }
        let mut lines = Vec::new();
        for row in &self.rows {
            let error = row
                .error
                .as_deref()
                .map(|value| format!(" error={value}"))
                .unwrap_or_default();
            lines.push(format!(
                "{} | project={} | status={} | progress={}%{}",
                row.job_id, row.project_id, row.status, row.progress, error
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for JobReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{} | status={} | progress={}%",
            self.job.job_id, self.job.status, self.job.progress
        )];
        if let Some(error) = &self.job.error {
            lines.push(format!("error: {error}"));
        }
        if let Some(analysis) = &self.analysis {
            lines.push(format!(
                "analysis: plan={} mode={} emotion={} operations={}",
                analysis.plan_id,
                analysis.mode,
                analysis.detected_emotion,
                analysis.operations_count
            ));
        }
        for artifact in &self.artifacts {
            let ready = if artifact.ready { "ready" } else { "pending" };
            lines.push(format!(
                "artifact: {} [{}] {} ({} bytes)",
                artifact.platform,
                ready,
                artifact.output_path.display(),
                artifact.size_bytes
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ArtifactView {
    pub job_id: String,
    pub platform: String,
    pub profile: String,
    pub output_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub checksum: Option<String>,
    pub copied_to: Option<PathBuf>,
}

impl DisplayFallback for ArtifactView {
    fn display(&self) -> String {
        let mut line = format!(
            "{} | {} | {} ({} bytes)",
            self.platform,
            self.profile,
            self.output_path.display(),
            self.size_bytes
        );
        if let Some(copied) = &self.copied_to {
            line.push_str(&format!(" -> {}", copied.display()));
        }
        line
    }
}

#[derive(Debug, Serialize)]
pub struct PreviewView {
    pub job_id: String,
    pub preview_path: PathBuf,
}

impl DisplayFallback for PreviewView {
    fn display(&self) -> String {
        format!("{}", self.preview_path.display())
    }
}

impl DisplayFallback for DeleteOutcome {
    fn display(&self) -> String {
        format!(
            "deleted {} ({} jobs removed)",
            self.project_id, self.jobs_removed
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BackupView {
    pub destination: PathBuf,
    pub kind: String,
}

impl DisplayFallback for BackupView {
    fn display(&self) -> String {
        format!("{} written to {}", self.kind, self.destination.display())
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| {
                format!(
                    "[{status}] {name}: {detail}",
                    status = entry.status,
                    name = entry.name,
                    detail = entry.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn write_test_config(root: &Path) -> PathBuf {
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        for dir in ["data", "media", "output", "music", "logs"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        let base = root.display();
        let config = format!(
            r#"
[system]
node_name = "montage-test"
environment = "test"

[paths]
base_dir = "{base}"
data_dir = "{base}/data"
media_dir = "{base}/media"
output_dir = "{base}/output"
music_dir = "{base}/music"
logs_dir = "{base}/logs"

[ingest]
max_upload_mb = 64
allowed_extensions = ["mp4", "mov"]

[analysis]
sample_rate = 16000
window_seconds = 0.5
silence_rms_threshold = 0.02
min_silence_seconds = 0.5
smoothing_window = 7
merge_gap_seconds = 1.0
min_segment_seconds = 0.5
ffmpeg_timeout_seconds = 10

[render]
video_codec = "libx264"
preset = "veryfast"
crf = 23
audio_bitrate = "192k"
ffmpeg_timeout_seconds = 10
default_platforms = ["youtube", "tiktok"]

[music]
default_volume = 0.15
duck_gain = 0.3
fade_ms = 300

[captions]
style = "standard"
min_cue_seconds = 0.08

[jobs]
max_attempts = 3
retry_delay_seconds = [1, 2]
stall_timeout_seconds = 30
"#
        );
        let path = configs_dir.join("montage.toml");
        fs::write(&path, config).unwrap();
        path
    }

    fn test_cli(config: PathBuf) -> Cli {
        Cli {
            config,
            data_dir: None,
            token: None,
            format: OutputFormat::Json,
            command: Commands::Health(HealthCommands::Check),
        }
    }

    #[tokio::test]
    async fn upload_registers_a_project() {
        let temp = TempDir::new().unwrap();
        let config = write_test_config(temp.path());
        let context = AppContext::new(&test_cli(config)).unwrap();

        let source = temp.path().join("clip.mp4");
        fs::write(&source, vec![7u8; 4096]).unwrap();

        let view = context
            .upload(&UploadArgs {
                source,
                name: None,
                platforms: vec!["youtube".to_string()],
                prompt: "cut the silence".to_string(),
            })
            .await
            .unwrap();
        assert!(view.project_id.starts_with("prj-"));
        assert_eq!(view.original_name, "clip.mp4");
        assert_eq!(view.platforms, vec!["youtube".to_string()]);

        let list = context.project_list(&ListArgs { limit: 10 }).unwrap();
        assert_eq!(list.rows.len(), 1);
    }

    #[tokio::test]
    async fn upload_defaults_to_configured_platforms() {
        let temp = TempDir::new().unwrap();
        let config = write_test_config(temp.path());
        let context = AppContext::new(&test_cli(config)).unwrap();

        let source = temp.path().join("clip.mov");
        fs::write(&source, vec![7u8; 4096]).unwrap();

        let view = context
            .upload(&UploadArgs {
                source,
                name: None,
                platforms: Vec::new(),
                prompt: "make it pop".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            view.platforms,
            vec!["youtube".to_string(), "tiktok".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_platform_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config = write_test_config(temp.path());
        let context = AppContext::new(&test_cli(config)).unwrap();
        let err = context.resolve_platforms(&["myspace".to_string()]);
        assert!(matches!(err, Err(AppError::Platform(_))));
    }

    #[tokio::test]
    async fn health_check_reports_config_and_database() {
        let temp = TempDir::new().unwrap();
        let config = write_test_config(temp.path());
        let context = AppContext::new(&test_cli(config)).unwrap();

        let report = context.health_check();
        let toml_entry = report
            .iter()
            .find(|entry| entry.name == "montage.toml")
            .unwrap();
        assert!(matches!(toml_entry.status, CheckStatus::Ok));
        let db_entry = report
            .iter()
            .find(|entry| entry.name == "montage.db")
            .unwrap();
        assert!(matches!(db_entry.status, CheckStatus::Ok));
        assert!(!report
            .iter()
            .any(|entry| matches!(entry.status, CheckStatus::Error)));
    }

    #[tokio::test]
    async fn backup_writes_snapshot_and_dump() {
        let temp = TempDir::new().unwrap();
        let config = write_test_config(temp.path());
        let context = AppContext::new(&test_cli(config)).unwrap();

        let snapshot = temp.path().join("backup.db");
        let view = context
            .backup(&BackupArgs {
                destination: snapshot.clone(),
                dump: false,
            })
            .unwrap();
        assert_eq!(view.kind, "snapshot");
        assert!(snapshot.exists());

        let dump = temp.path().join("jobs.sql.gz");
        let view = context
            .backup(&BackupArgs {
                destination: dump.clone(),
                dump: true,
            })
            .unwrap();
        assert_eq!(view.kind, "sql-dump");
        assert!(dump.exists());
    }

    #[test]
    fn token_gate_is_open_without_environment_token() {
        let cli = test_cli(PathBuf::from("configs/montage.toml"));
        assert!(enforce_token(&cli).is_ok());
    }
}
