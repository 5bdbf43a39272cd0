use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::Serialize;

use crate::render::Platform;

use super::error::ProjectResult;

/// Immutable record created at ingest. The identifier is stable for the
/// project's whole lifetime; retention/garbage collection is an external
/// concern.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub project_id: String,
    pub source_path: PathBuf,
    pub original_name: String,
    pub container: Option<String>,
    pub size_bytes: u64,
    pub duration_seconds: Option<f64>,
    pub platforms: Vec<Platform>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn serialize_platforms(&self) -> String {
        self.platforms
            .iter()
            .map(Platform::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_row(row: &Row<'_>) -> ProjectResult<Self> {
        let source_path: String = row.get("source_path")?;
        let platforms_raw: String = row.get("platforms")?;
        let platforms = Platform::parse_list(&platforms_raw)?;
        Ok(Self {
            project_id: row.get("project_id")?,
            source_path: PathBuf::from(source_path),
            original_name: row.get("original_name")?,
            container: row.get("container")?,
            size_bytes: row.get::<_, i64>("size_bytes")? as u64,
            duration_seconds: row.get("duration_seconds")?,
            platforms,
            created_at: row.get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_serialization_is_comma_joined() {
        let project = Project {
            project_id: "prj-1".into(),
            source_path: PathBuf::from("/tmp/source.mp4"),
            original_name: "clip.mp4".into(),
            container: Some("mp4".into()),
            size_bytes: 1024,
            duration_seconds: Some(12.5),
            platforms: vec![Platform::Youtube, Platform::Tiktok],
            created_at: Utc::now(),
        };
        assert_eq!(project.serialize_platforms(), "youtube,tiktok");
    }
}
