use tracing::{debug, info};

use super::error::JobResult;
use super::models::{Job, JobStatus};
use super::store::SqliteJobStore;

/// Single writer for one job row. Every pipeline stage reports through the
/// tracker so the store's transition gate sees each write.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    store: SqliteJobStore,
    job_id: String,
}

impl StatusTracker {
    pub fn new(store: SqliteJobStore, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn advance(&self, status: JobStatus, progress: u8) -> JobResult<Job> {
        let job = self.store.update_status(&self.job_id, status, progress, None)?;
        debug!(
            target: "montage::job",
            job_id = %self.job_id,
            status = %job.status,
            progress = job.progress,
            "job advanced"
        );
        Ok(job)
    }

    pub fn complete(&self) -> JobResult<Job> {
        let job = self
            .store
            .update_status(&self.job_id, JobStatus::Completed, 100, None)?;
        info!(target: "montage::job", job_id = %self.job_id, "job completed");
        Ok(job)
    }

    /// Passing progress 0 keeps the current value thanks to the store's
    /// monotonic clamp.
    pub fn fail(&self, message: &str) -> JobResult<Job> {
        let job = self
            .store
            .update_status(&self.job_id, JobStatus::Failed, 0, Some(message))?;
        info!(
            target: "montage::job",
            job_id = %self.job_id,
            error = message,
            "job failed"
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SqliteJobStore {
        let store = SqliteJobStore::new(dir.path().join("jobs.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    #[test]
    fn tracker_walks_the_full_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job = Job::new("prj-track");
        store.insert_job(&job).unwrap();

        let tracker = StatusTracker::new(store.clone(), &job.job_id);
        tracker.advance(JobStatus::Analyzing, 5).unwrap();
        tracker.advance(JobStatus::Analyzing, 20).unwrap();
        tracker.advance(JobStatus::Processing, 45).unwrap();
        let done = tracker.complete().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
    }

    #[test]
    fn fail_preserves_reached_progress() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job = Job::new("prj-track");
        store.insert_job(&job).unwrap();

        let tracker = StatusTracker::new(store, &job.job_id);
        tracker.advance(JobStatus::Analyzing, 18).unwrap();
        let failed = tracker.fail("analysis crashed").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.progress, 18);
        assert_eq!(failed.error.as_deref(), Some("analysis crashed"));
    }

    #[test]
    fn terminal_jobs_reject_further_writes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job = Job::new("prj-track");
        store.insert_job(&job).unwrap();

        let tracker = StatusTracker::new(store, &job.job_id);
        tracker.fail("boom").unwrap();
        assert!(tracker.advance(JobStatus::Analyzing, 10).is_err());
        assert!(tracker.complete().is_err());
    }
}
