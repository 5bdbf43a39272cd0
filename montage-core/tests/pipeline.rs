use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use montage_core::{
    load_montage_config, CommandExecutor, EmotionLabel, Job, JobError, JobReport, JobStatus,
    MediaIngestor, MontageConfig, Orchestrator, Platform, PlanMode, Project,
};

struct MissingTool;

#[async_trait]
impl CommandExecutor for MissingTool {
    async fn run(&self, _command: &mut Command) -> std::io::Result<Output> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not installed",
        ))
    }
}

/// Pretends ffmpeg is installed but broken for the instagram encode only,
/// every other invocation behaves like a missing binary.
struct InstagramEncoderDown;

#[async_trait]
impl CommandExecutor for InstagramEncoderDown {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        use std::os::unix::process::ExitStatusExt;
        let instagram_output = command
            .as_std()
            .get_args()
            .any(|arg| arg.to_string_lossy().ends_with("instagram_9x16.mp4"));
        if instagram_output {
            Ok(Output {
                status: std::process::ExitStatus::from_raw(256),
                stdout: Vec::new(),
                stderr: b"encoder exploded".to_vec(),
            })
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "not installed",
            ))
        }
    }
}

fn test_config(root: &Path) -> Arc<MontageConfig> {
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/montage.toml");
    let mut config = load_montage_config(fixture).expect("fixture config");
    config.paths.base_dir = root.display().to_string();
    config.paths.data_dir = "data".to_string();
    config.paths.media_dir = root.join("media").display().to_string();
    config.paths.output_dir = "output".to_string();
    config.paths.music_dir = "music".to_string();
    config.paths.logs_dir = "logs".to_string();
    Arc::new(config)
}

fn test_orchestrator(root: &Path) -> (Arc<MontageConfig>, Arc<Orchestrator>) {
    let config = test_config(root);
    let orchestrator = Orchestrator::with_executor(Arc::clone(&config), Arc::new(MissingTool))
        .expect("orchestrator");
    (config, Arc::new(orchestrator))
}

async fn ingest_sample(
    config: &Arc<MontageConfig>,
    orchestrator: &Arc<Orchestrator>,
    root: &Path,
    platforms: &[Platform],
) -> Project {
    let source = root.join("upload.mp4");
    tokio::fs::write(&source, vec![7u8; 4096]).await.unwrap();
    let ingestor = MediaIngestor::with_executor(
        Arc::clone(config),
        orchestrator.project_store().clone(),
        Arc::new(MissingTool),
    );
    ingestor
        .ingest(&source, "upload.mp4", platforms, "make this video shine")
        .await
        .expect("ingest sample upload")
}

async fn wait_for_terminal(orchestrator: &Arc<Orchestrator>, job_id: &str) -> JobReport {
    for _ in 0..600 {
        let report = orchestrator.status(job_id).expect("job status");
        if report.job.status.is_terminal() {
            return report;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached a terminal status");
}

#[tokio::test]
async fn concurrent_ingests_get_distinct_projects() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let source = root.path().join("upload.mp4");
    tokio::fs::write(&source, vec![7u8; 4096]).await.unwrap();

    let ingestor = Arc::new(MediaIngestor::with_executor(
        Arc::clone(&config),
        orchestrator.project_store().clone(),
        Arc::new(MissingTool),
    ));
    let uploads = (0..4).map(|n| {
        let ingestor = Arc::clone(&ingestor);
        let source = source.clone();
        async move {
            ingestor
                .ingest(
                    &source,
                    &format!("take_{n}.mp4"),
                    &[Platform::Youtube],
                    "make this video shine",
                )
                .await
                .expect("concurrent ingest")
        }
    });
    let projects = futures::future::join_all(uploads).await;

    let ids: std::collections::HashSet<_> =
        projects.iter().map(|p| p.project_id.clone()).collect();
    assert_eq!(ids.len(), 4);
    for project in &projects {
        assert!(project.source_path.exists());
    }
}

#[tokio::test]
async fn pipeline_completes_end_to_end_without_media_tools() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let report = wait_for_terminal(&orchestrator, &job.job_id).await;
    assert_eq!(report.job.status, JobStatus::Completed);
    assert_eq!(report.job.progress, 100);
    assert!(report.job.error.is_none());

    let analysis = report.analysis.expect("analysis summary");
    assert_eq!(analysis.mode, PlanMode::Auto);
    assert_eq!(analysis.detected_emotion, EmotionLabel::Default);
    assert_eq!(analysis.operations_count, 2);

    assert_eq!(report.artifacts.len(), 2);
    for artifact in &report.artifacts {
        assert!(artifact.ready);
        assert_eq!(artifact.checksum.as_deref().map(str::len), Some(64));
        let payload = std::fs::read_to_string(&artifact.output_path).unwrap();
        assert!(payload.starts_with("RENDER-STUB"));
        assert!(artifact.preview_path.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn start_returns_the_active_job_instead_of_a_second_run() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let queued = Job::new(&project.project_id);
    orchestrator.job_store().insert_job(&queued).unwrap();

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    assert_eq!(job.job_id, queued.job_id);
    assert_eq!(orchestrator.list_jobs(10).unwrap().len(), 1);
}

#[tokio::test]
async fn start_rejects_unknown_projects() {
    let root = TempDir::new().unwrap();
    let (_config, orchestrator) = test_orchestrator(root.path());
    let err = orchestrator.start("prj-ghost", "trim the silences").unwrap_err();
    assert!(matches!(err, JobError::Project(_)));
}

#[tokio::test]
async fn downloads_gate_on_ready_artifacts() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let queued = Job::new(&project.project_id);
    orchestrator.job_store().insert_job(&queued).unwrap();
    assert!(matches!(
        orchestrator.download(&queued.job_id, Platform::Youtube).unwrap_err(),
        JobError::ArtifactNotReady { .. }
    ));
    assert!(matches!(
        orchestrator.preview(&queued.job_id).unwrap_err(),
        JobError::ArtifactNotReady { .. }
    ));
    assert!(matches!(
        orchestrator.download("job-ghost", Platform::Youtube).unwrap_err(),
        JobError::NotFound { .. }
    ));
}

#[tokio::test]
async fn finished_jobs_serve_downloads_and_previews() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    wait_for_terminal(&orchestrator, &job.job_id).await;

    let artifact = orchestrator.download(&job.job_id, Platform::Tiktok).unwrap();
    assert_eq!(artifact.platform, Platform::Tiktok);
    assert!(artifact.output_path.exists());

    let preview = orchestrator.preview(&job.job_id).unwrap();
    assert!(preview.exists());

    // instagram was never requested for this project
    assert!(matches!(
        orchestrator.download(&job.job_id, Platform::Instagram).unwrap_err(),
        JobError::ArtifactNotReady { .. }
    ));
}

#[tokio::test]
async fn one_failed_platform_fails_the_job_but_keeps_siblings_downloadable() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());
    let orchestrator = Arc::new(
        Orchestrator::with_executor(Arc::clone(&config), Arc::new(InstagramEncoderDown))
            .expect("orchestrator"),
    );
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Instagram, Platform::Tiktok],
    )
    .await;

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    let report = wait_for_terminal(&orchestrator, &job.job_id).await;

    assert_eq!(report.job.status, JobStatus::Failed);
    let error = report.job.error.expect("failure reason");
    assert!(error.contains("instagram"));

    assert_eq!(report.artifacts.len(), 2);
    for platform in [Platform::Youtube, Platform::Tiktok] {
        let artifact = orchestrator.download(&job.job_id, platform).unwrap();
        assert!(artifact.ready);
        assert!(artifact.output_path.exists());
    }
    assert!(matches!(
        orchestrator.download(&job.job_id, Platform::Instagram).unwrap_err(),
        JobError::ArtifactNotReady { .. }
    ));
}

#[tokio::test]
async fn status_reads_resolve_by_project_as_well() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    assert!(matches!(
        orchestrator.status_for_project(&project.project_id).unwrap_err(),
        JobError::NotFound { .. }
    ));
    assert!(matches!(
        orchestrator.status_for_project("prj-ghost").unwrap_err(),
        JobError::Project(_)
    ));

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    wait_for_terminal(&orchestrator, &job.job_id).await;

    let report = orchestrator.status_for_project(&project.project_id).unwrap();
    assert_eq!(report.job.job_id, job.job_id);
    assert_eq!(report.job.status, JobStatus::Completed);
}

#[tokio::test]
async fn delete_is_refused_while_a_job_is_live() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let queued = Job::new(&project.project_id);
    orchestrator.job_store().insert_job(&queued).unwrap();

    let err = orchestrator.delete_project(&project.project_id).await.unwrap_err();
    assert!(matches!(err, JobError::JobActive { .. }));
    assert!(orchestrator.project_store().fetch_project(&project.project_id).is_ok());
}

#[tokio::test]
async fn delete_project_clears_rows_and_directories() {
    let root = TempDir::new().unwrap();
    let (config, orchestrator) = test_orchestrator(root.path());
    let project = ingest_sample(
        &config,
        &orchestrator,
        root.path(),
        &[Platform::Youtube, Platform::Tiktok],
    )
    .await;

    let job = orchestrator
        .start(&project.project_id, "make this video shine")
        .unwrap();
    wait_for_terminal(&orchestrator, &job.job_id).await;

    let media_dir = root.path().join("media").join(&project.project_id);
    let output_dir = root.path().join("output").join(&project.project_id);
    assert!(media_dir.exists());
    assert!(output_dir.exists());

    let outcome = orchestrator.delete_project(&project.project_id).await.unwrap();
    assert_eq!(outcome.jobs_removed, 1);
    assert!(outcome.project_removed);
    assert!(!media_dir.exists());
    assert!(!output_dir.exists());
    assert!(matches!(
        orchestrator.status(&job.job_id).unwrap_err(),
        JobError::NotFound { .. }
    ));
    assert!(matches!(
        orchestrator.delete_project(&project.project_id).await.unwrap_err(),
        JobError::Project(_)
    ));
}
