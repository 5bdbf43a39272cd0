use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::sqlite::configure_connection;

use super::error::{ProjectError, ProjectResult};
use super::models::Project;

const PROJECT_SCHEMA: &str = include_str!("../../../sql/projects.sql");

#[derive(Debug, Clone)]
pub struct SqliteProjectStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteProjectStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteProjectStoreBuilder {
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

    pub fn build(self) -> ProjectResult<SqliteProjectStore> {
        let path = self.path.ok_or(ProjectError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteProjectStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteProjectStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteProjectStore {
    pub fn builder() -> SqliteProjectStoreBuilder {
        SqliteProjectStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> ProjectResult<Self> {
        SqliteProjectStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> ProjectResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            ProjectError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| ProjectError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> ProjectResult<()> {
        let conn = self.open()?;
        conn.execute_batch(PROJECT_SCHEMA)?;
        Ok(())
    }

    pub fn insert_project(&self, project: &Project) -> ProjectResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO projects (
                project_id, source_path, original_name, container, size_bytes,
                duration_seconds, platforms, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.project_id,
                project.source_path.to_string_lossy(),
                project.original_name,
                project.container,
                project.size_bytes as i64,
                project.duration_seconds,
                project.serialize_platforms(),
                project.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn fetch_project(&self, project_id: &str) -> ProjectResult<Project> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, source_path, original_name, container, size_bytes,
                    duration_seconds, platforms, created_at
             FROM projects WHERE project_id = ?1",
        )?;
        let project = stmt
            .query_row(params![project_id], |row| {
                Ok(Project::from_row(row))
            })
            .optional()?;
        match project {
            Some(result) => result,
            None => Err(ProjectError::NotFound {
                project_id: project_id.to_string(),
            }),
        }
    }

    pub fn list_projects(&self, limit: usize) -> ProjectResult<Vec<Project>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, source_path, original_name, container, size_bytes,
                    duration_seconds, platforms, created_at
             FROM projects ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| Ok(Project::from_row(row)))?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row??);
        }
        Ok(projects)
    }

    pub fn delete_project(&self, project_id: &str) -> ProjectResult<bool> {
        let conn = self.open()?;
        let removed = conn.execute("DELETE FROM projects WHERE project_id = ?1", params![project_id])?;
        Ok(removed > 0)
    }
}
