use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tempfile::TempDir;

use montage_core::{
    ArtifactRecord, EditPlan, EmotionLabel, Job, JobError, JobStatus, Operation, PlanMode,
    Platform, SqliteJobStore, TimeRange, TrimReason,
};

fn temp_store(dir: &Path) -> SqliteJobStore {
    let store = SqliteJobStore::builder()
        .path(dir.join("montage.db"))
        .create_if_missing(true)
        .build()
        .expect("create store");
    store.initialize().expect("initialize store");
    store
}

#[test]
fn insert_and_fetch_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());

    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    let fetched = store.fetch_job(&job.job_id).unwrap();
    assert_eq!(fetched.job_id, job.job_id);
    assert_eq!(fetched.project_id, "prj-1");
    assert_eq!(fetched.status, JobStatus::Queued);
    assert_eq!(fetched.progress, 0);
    assert!(fetched.mode.is_none());
}

#[test]
fn unknown_job_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let err = store.fetch_job("job-missing").unwrap_err();
    assert!(matches!(err, JobError::NotFound { .. }));
}

#[test]
fn status_walks_forward_and_rejects_skips() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    store
        .update_status(&job.job_id, JobStatus::Analyzing, 10, None)
        .unwrap();
    store
        .update_status(&job.job_id, JobStatus::Processing, 30, None)
        .unwrap();
    let err = store
        .update_status(&job.job_id, JobStatus::Analyzing, 35, None)
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));

    let done = store
        .update_status(&job.job_id, JobStatus::Completed, 100, None)
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}

#[test]
fn queued_jobs_cannot_jump_to_completed() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    let err = store
        .update_status(&job.job_id, JobStatus::Completed, 100, None)
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
}

#[test]
fn progress_never_moves_backwards() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    store
        .update_status(&job.job_id, JobStatus::Analyzing, 18, None)
        .unwrap();
    let updated = store
        .update_status(&job.job_id, JobStatus::Analyzing, 4, None)
        .unwrap();
    assert_eq!(updated.progress, 18);

    let failed = store
        .update_status(&job.job_id, JobStatus::Failed, 0, Some("boom"))
        .unwrap();
    assert_eq!(failed.progress, 18);
    assert_eq!(failed.error.as_deref(), Some("boom"));
}

#[test]
fn terminal_jobs_are_frozen() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    store
        .update_status(&job.job_id, JobStatus::Failed, 0, Some("crashed"))
        .unwrap();
    let err = store
        .update_status(&job.job_id, JobStatus::Analyzing, 50, None)
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
}

#[test]
fn active_lookup_skips_terminal_jobs() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());

    let finished = Job::new("prj-1");
    store.insert_job(&finished).unwrap();
    store
        .update_status(&finished.job_id, JobStatus::Failed, 0, Some("gone"))
        .unwrap();
    assert!(store.fetch_active_for_project("prj-1").unwrap().is_none());

    let running = Job::new("prj-1");
    store.insert_job(&running).unwrap();
    let active = store.fetch_active_for_project("prj-1").unwrap().unwrap();
    assert_eq!(active.job_id, running.job_id);
}

#[test]
fn analysis_summary_is_recorded() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    store
        .set_analysis(&job.job_id, "auto", "excited", 5)
        .unwrap();
    let fetched = store.fetch_job(&job.job_id).unwrap();
    assert_eq!(fetched.mode, Some(PlanMode::Auto));
    assert_eq!(fetched.detected_emotion, Some(EmotionLabel::Excited));
    assert_eq!(fetched.operations_count, Some(5));
}

#[test]
fn artifact_upsert_replaces_per_platform() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();

    let mut artifact = ArtifactRecord {
        job_id: job.job_id.clone(),
        platform: Platform::Youtube,
        profile: "youtube_16x9".to_string(),
        output_path: dir.path().join("a.mp4"),
        preview_path: None,
        size_bytes: 10,
        checksum: None,
        ready: false,
        created_at: chrono::Utc::now(),
    };
    store.upsert_artifact(&artifact).unwrap();

    artifact.size_bytes = 2048;
    artifact.checksum = Some("abc".to_string());
    artifact.ready = true;
    store.upsert_artifact(&artifact).unwrap();

    let artifacts = store.list_artifacts(&job.job_id).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].size_bytes, 2048);
    assert!(artifacts[0].ready);
    assert_eq!(artifacts[0].checksum.as_deref(), Some("abc"));
}

#[test]
fn latest_plan_round_trips_operations() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());

    let first = EditPlan::new(
        "prj-1",
        PlanMode::Auto,
        EmotionLabel::Neutral,
        vec![Operation::Trim {
            reason: TrimReason::Silence,
            ranges: vec![TimeRange::new(1.0, 2.0)],
        }],
        Some(30.0),
    );
    store.insert_plan(&first).unwrap();

    let second = EditPlan::new(
        "prj-1",
        PlanMode::Custom,
        EmotionLabel::Happy,
        vec![
            Operation::Trim {
                reason: TrimReason::Filler,
                ranges: vec![TimeRange::new(0.0, 0.5)],
            },
            Operation::Reorder { order: vec![1, 0] },
        ],
        Some(30.0),
    );
    store.insert_plan(&second).unwrap();

    let latest = store.fetch_latest_plan("prj-1").unwrap().unwrap();
    assert_eq!(latest.plan_id, second.plan_id);
    assert_eq!(latest.mode, PlanMode::Custom);
    assert_eq!(latest.operations.len(), 2);
    assert!(store.fetch_latest_plan("prj-other").unwrap().is_none());
}

#[test]
fn delete_for_project_cascades() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-1");
    store.insert_job(&job).unwrap();
    store
        .upsert_artifact(&ArtifactRecord {
            job_id: job.job_id.clone(),
            platform: Platform::Tiktok,
            profile: "tiktok_9x16".to_string(),
            output_path: dir.path().join("t.mp4"),
            preview_path: None,
            size_bytes: 1,
            checksum: None,
            ready: true,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
    store
        .insert_plan(&EditPlan::new(
            "prj-1",
            PlanMode::Auto,
            EmotionLabel::Default,
            vec![],
            None,
        ))
        .unwrap();

    let removed = store.delete_for_project("prj-1").unwrap();
    assert_eq!(removed, 1);
    assert!(matches!(
        store.fetch_job(&job.job_id).unwrap_err(),
        JobError::NotFound { .. }
    ));
    assert!(store.list_artifacts(&job.job_id).unwrap().is_empty());
    assert!(store.fetch_latest_plan("prj-1").unwrap().is_none());
}

#[test]
fn export_backup_writes_restorable_dump() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-backup");
    store.insert_job(&job).unwrap();

    let backup_path = dir.path().join("backups/jobs.sql.gz");
    store.export_backup(&backup_path).unwrap();

    let file = std::fs::File::open(&backup_path).unwrap();
    let mut dump = String::new();
    GzDecoder::new(file).read_to_string(&mut dump).unwrap();
    assert!(dump.contains("CREATE TABLE IF NOT EXISTS jobs"));
    assert!(dump.contains(&job.job_id));
    assert!(dump.contains("COMMIT;"));
}

#[test]
fn snapshot_backup_is_a_usable_database() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(dir.path());
    let job = Job::new("prj-snap");
    store.insert_job(&job).unwrap();

    let snapshot_path = dir.path().join("snapshot.db");
    store.backup_to(&snapshot_path).unwrap();

    let copy = SqliteJobStore::new(&snapshot_path).unwrap();
    let restored = copy.fetch_job(&job.job_id).unwrap();
    assert_eq!(restored.project_id, "prj-snap");
}
