use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use flate2::{write::GzEncoder, Compression};
use rusqlite::backup::Backup;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::plan::EditPlan;
use crate::sqlite::configure_connection;

use super::error::{JobError, JobResult};
use super::models::{ArtifactRecord, Job, JobStatus};

const JOB_SCHEMA: &str = include_str!("../../../sql/jobs.sql");

#[derive(Debug, Clone)]
pub struct SqliteJobStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteJobStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteJobStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> JobResult<SqliteJobStore> {
        let path = self.path.ok_or(JobError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteJobStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteJobStore {
    pub fn builder() -> SqliteJobStoreBuilder {
        SqliteJobStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> JobResult<Self> {
        SqliteJobStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> JobResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            JobError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| JobError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute_batch(JOB_SCHEMA)?;
        Ok(())
    }

    pub fn insert_job(&self, job: &Job) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO jobs (
                job_id, project_id, status, progress, error, mode,
                detected_emotion, operations_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.job_id,
                job.project_id,
                job.status.as_str(),
                i64::from(job.progress),
                job.error,
                job.mode.map(|mode| mode.as_str()),
                job.detected_emotion.map(|emotion| emotion.as_str()),
                job.operations_count.map(i64::from),
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn fetch_job(&self, job_id: &str) -> JobResult<Job> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, project_id, status, progress, error, mode,
                    detected_emotion, operations_count, created_at, updated_at
             FROM jobs WHERE job_id = ?1",
        )?;
        let job = stmt
            .query_row(params![job_id], |row| Ok(Job::from_row(row)))
            .optional()?;
        match job {
            Some(result) => result,
            None => Err(JobError::NotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    /// Live job for a project, if one exists. Used to keep `start`
    /// idempotent while a run is underway.
    pub fn fetch_active_for_project(&self, project_id: &str) -> JobResult<Option<Job>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, project_id, status, progress, error, mode,
                    detected_emotion, operations_count, created_at, updated_at
             FROM jobs
             WHERE project_id = ?1 AND status NOT IN ('completed', 'failed')
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let job = stmt
            .query_row(params![project_id], |row| Ok(Job::from_row(row)))
            .optional()?;
        job.transpose()
    }

    /// Newest job for a project regardless of status. Project-keyed status
    /// reads resolve through this when no run is live.
    pub fn fetch_latest_for_project(&self, project_id: &str) -> JobResult<Option<Job>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, project_id, status, progress, error, mode,
                    detected_emotion, operations_count, created_at, updated_at
             FROM jobs
             WHERE project_id = ?1
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let job = stmt
            .query_row(params![project_id], |row| Ok(Job::from_row(row)))
            .optional()?;
        job.transpose()
    }

    pub fn list_jobs(&self, limit: usize) -> JobResult<Vec<Job>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, project_id, status, progress, error, mode,
                    detected_emotion, operations_count, created_at, updated_at
             FROM jobs ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| Ok(Job::from_row(row)))?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row??);
        }
        Ok(jobs)
    }

    /// Single gate for every status write. Terminal jobs reject further
    /// writes, progress is clamped so it never moves backwards, and the
    /// transition itself must be legal.
    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> JobResult<Job> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let current = {
            let mut stmt = tx.prepare(
                "SELECT job_id, project_id, status, progress, error, mode,
                        detected_emotion, operations_count, created_at, updated_at
                 FROM jobs WHERE job_id = ?1",
            )?;
            let job = stmt
                .query_row(params![job_id], |row| Ok(Job::from_row(row)))
                .optional()?;
            match job {
                Some(result) => result?,
                None => {
                    return Err(JobError::NotFound {
                        job_id: job_id.to_string(),
                    })
                }
            }
        };
        if !current.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        let clamped = progress.max(current.progress).min(100);
        let now = Utc::now();
        tx.execute(
            "UPDATE jobs SET status = ?2, progress = ?3, error = ?4, updated_at = ?5
             WHERE job_id = ?1",
            params![job_id, status.as_str(), i64::from(clamped), error, now],
        )?;
        tx.commit()?;
        let mut updated = current;
        updated.status = status;
        updated.progress = clamped;
        updated.error = error.map(|value| value.to_string());
        updated.updated_at = now;
        Ok(updated)
    }

    pub fn set_analysis(
        &self,
        job_id: &str,
        mode: &str,
        detected_emotion: &str,
        operations_count: u32,
    ) -> JobResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE jobs SET mode = ?2, detected_emotion = ?3, operations_count = ?4,
                    updated_at = ?5
             WHERE job_id = ?1",
            params![
                job_id,
                mode,
                detected_emotion,
                i64::from(operations_count),
                Utc::now(),
            ],
        )?;
        if affected == 0 {
            return Err(JobError::NotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn upsert_artifact(&self, artifact: &ArtifactRecord) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO job_artifacts (
                job_id, platform, profile, output_path, preview_path,
                size_bytes, checksum, ready, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(job_id, platform) DO UPDATE SET
                profile = excluded.profile,
                output_path = excluded.output_path,
                preview_path = excluded.preview_path,
                size_bytes = excluded.size_bytes,
                checksum = excluded.checksum,
                ready = excluded.ready",
            params![
                artifact.job_id,
                artifact.platform.as_str(),
                artifact.profile,
                artifact.output_path.to_string_lossy(),
                artifact
                    .preview_path
                    .as_ref()
                    .map(|path| path.to_string_lossy().to_string()),
                artifact.size_bytes as i64,
                artifact.checksum,
                i64::from(artifact.ready),
                artifact.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_artifacts(&self, job_id: &str) -> JobResult<Vec<ArtifactRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, platform, profile, output_path, preview_path,
                    size_bytes, checksum, ready, created_at
             FROM job_artifacts WHERE job_id = ?1 ORDER BY platform",
        )?;
        let rows = stmt.query_map(params![job_id], |row| Ok(ArtifactRecord::from_row(row)))?;
        let mut artifacts = Vec::new();
        for row in rows {
            artifacts.push(row??);
        }
        Ok(artifacts)
    }

    pub fn insert_plan(&self, plan: &EditPlan) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO plans (
                plan_id, project_id, mode, detected_emotion, operations,
                source_duration, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                plan.plan_id,
                plan.project_id,
                plan.mode.as_str(),
                plan.detected_emotion.as_str(),
                plan.encode_operations()?,
                plan.source_duration,
                plan.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn fetch_latest_plan(&self, project_id: &str) -> JobResult<Option<EditPlan>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT plan_id, project_id, mode, detected_emotion, operations,
                    source_duration, created_at
             FROM plans WHERE project_id = ?1 ORDER BY created_at DESC LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![project_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, chrono::DateTime<Utc>>(6)?,
                ))
            })
            .optional()?;
        let Some((plan_id, project_id, mode, emotion, operations, source_duration, created_at)) =
            row
        else {
            return Ok(None);
        };
        let mode = mode.parse().map_err(JobError::UnknownStatus)?;
        let detected_emotion = emotion.parse().map_err(JobError::UnknownStatus)?;
        Ok(Some(EditPlan {
            plan_id,
            project_id,
            mode,
            detected_emotion,
            operations: EditPlan::decode_operations(&operations)?,
            source_duration,
            created_at,
        }))
    }

    pub fn delete_for_project(&self, project_id: &str) -> JobResult<usize> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM job_artifacts WHERE job_id IN
                (SELECT job_id FROM jobs WHERE project_id = ?1)",
            params![project_id],
        )?;
        conn.execute("DELETE FROM plans WHERE project_id = ?1", params![project_id])?;
        let removed = conn.execute("DELETE FROM jobs WHERE project_id = ?1", params![project_id])?;
        Ok(removed)
    }

    /// Gzipped SQL dump of the jobs table, restorable with plain sqlite3.
    pub fn export_backup(&self, output: impl AsRef<Path>) -> JobResult<()> {
        let output = output.as_ref();
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|source| JobError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }
        let conn = self.open()?;
        let mut dump = String::new();
        dump.push_str(JOB_SCHEMA);
        dump.push('\n');
        dump.push_str("BEGIN;\n");

        let mut stmt = conn.prepare(
            "SELECT job_id, project_id, status, progress, error, mode,
                    detected_emotion, operations_count, created_at, updated_at
             FROM jobs ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<i64>>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;
        for row in rows {
            let (
                job_id,
                project_id,
                status,
                progress,
                error,
                mode,
                emotion,
                operations_count,
                created_at,
                updated_at,
            ) = row?;
            dump.push_str(&format!(
                "INSERT INTO jobs (job_id, project_id, status, progress, error, mode, detected_emotion, operations_count, created_at, updated_at) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {});\n",
                sql_quote(&job_id),
                sql_quote(&project_id),
                sql_quote(&status),
                progress,
                format_optional_text(error),
                format_optional_text(mode),
                format_optional_text(emotion),
                format_optional_integer(operations_count),
                sql_quote(&created_at),
                sql_quote(&updated_at),
            ));
        }
        dump.push_str("COMMIT;\n");

        let file = File::create(output).map_err(|source| JobError::Io {
            source,
            path: output.to_path_buf(),
        })?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(dump.as_bytes()).map_err(|source| JobError::Io {
            source,
            path: output.to_path_buf(),
        })?;
        encoder.finish().map_err(|source| JobError::Io {
            source,
            path: output.to_path_buf(),
        })?;
        Ok(())
    }

    pub fn backup_to(&self, destination: impl AsRef<Path>) -> JobResult<()> {
        let destination_path = destination.as_ref();
        let source = self.open()?;
        let mut dest = Connection::open(destination_path)?;
        configure_connection(&dest).map_err(|source| JobError::OpenDatabase {
            source,
            path: destination_path.to_path_buf(),
        })?;
        let backup = Backup::new(&source, &mut dest)?;
        backup.run_to_completion(10, Duration::from_millis(50), None)?;
        Ok(())
    }
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn format_optional_text(value: Option<String>) -> String {
    match value {
        Some(text) => sql_quote(&text),
        None => "NULL".to_string(),
    }
}

fn format_optional_integer(value: Option<i64>) -> String {
    match value {
        Some(number) => number.to_string(),
        None => "NULL".to_string(),
    }
}
