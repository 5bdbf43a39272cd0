use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::config::MontageConfig;
use crate::project::{Project, SqliteProjectStore};
use crate::render::Platform;
use crate::tool::{CommandExecutor, SystemCommandExecutor};

use super::error::{MediaError, MediaResult};
use super::probe::MediaProber;

const MIN_PROMPT_CHARS: usize = 3;

/// Validates and persists an upload, allocating a fresh project identifier.
/// No processing happens here; rejected uploads never create a job.
pub struct MediaIngestor {
    config: Arc<MontageConfig>,
    store: SqliteProjectStore,
    prober: MediaProber,
}

impl MediaIngestor {
    pub fn new(config: Arc<MontageConfig>, store: SqliteProjectStore) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
        Self::with_executor(config, store, executor)
    }

    pub fn with_executor(
        config: Arc<MontageConfig>,
        store: SqliteProjectStore,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let timeout = Duration::from_secs(config.analysis.ffmpeg_timeout_seconds);
        let prober = MediaProber::new(executor, timeout);
        Self {
            config,
            store,
            prober,
        }
    }

    pub async fn ingest(
        &self,
        source: &Path,
        original_name: &str,
        platforms: &[Platform],
        prompt: &str,
    ) -> MediaResult<Project> {
        if prompt.trim().chars().count() < MIN_PROMPT_CHARS {
            return Err(MediaError::InvalidInput(
                "prompt must be at least 3 characters".to_string(),
            ));
        }
        if platforms.is_empty() {
            return Err(MediaError::InvalidInput(
                "at least one platform must be requested".to_string(),
            ));
        }

        let extension = self.validate_extension(original_name)?;
        let metadata = fs::metadata(source).await.map_err(|source_err| MediaError::Io {
            source: source_err,
            path: source.to_path_buf(),
        })?;
        if metadata.len() == 0 {
            return Err(MediaError::InvalidInput("empty media upload".to_string()));
        }
        let max_bytes = self.config.ingest.max_upload_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(MediaError::InvalidInput(format!(
                "upload exceeds {} MB limit",
                self.config.ingest.max_upload_mb
            )));
        }

        let project_id = format!("prj-{}", Uuid::new_v4().simple());
        let project_dir = Path::new(&self.config.paths.media_dir).join(&project_id);
        fs::create_dir_all(&project_dir)
            .await
            .map_err(|source_err| MediaError::Io {
                source: source_err,
                path: project_dir.clone(),
            })?;
        let dest = project_dir.join(format!("source.{extension}"));
        fs::copy(source, &dest)
            .await
            .map_err(|source_err| MediaError::Io {
                source: source_err,
                path: dest.clone(),
            })?;

        let probe = self.prober.probe(&dest).await?;
        let project = Project {
            project_id,
            source_path: dest,
            original_name: original_name.to_string(),
            container: probe.container.clone(),
            size_bytes: probe.size_bytes,
            duration_seconds: probe.duration_seconds,
            platforms: platforms.to_vec(),
            created_at: Utc::now(),
        };
        self.store.insert_project(&project)?;

        info!(
            target: "montage::ingest",
            project_id = %project.project_id,
            size_bytes = project.size_bytes,
            duration = ?project.duration_seconds,
            source = %probe.analysis_source,
            platforms = %project.serialize_platforms(),
            "project ingested"
        );
        Ok(project)
    }

    fn validate_extension(&self, original_name: &str) -> MediaResult<String> {
        let extension = Path::new(original_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .ok_or_else(|| {
                MediaError::InvalidInput(format!("missing file extension: {original_name}"))
            })?;
        if !self
            .config
            .ingest
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(MediaError::InvalidInput(format!(
                "unsupported media format: {extension}"
            )));
        }
        Ok(extension)
    }
}
