use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;

use crate::tool::{run_tool, CommandExecutor, ToolOutcome};

use super::error::{MediaError, MediaResult};

/// Container-level facts about an uploaded source, gathered before any
/// processing starts.
#[derive(Debug, Clone)]
pub struct SourceProbe {
    pub analysis_source: String,
    pub container: Option<String>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: u64,
    pub has_audio: bool,
}

pub struct MediaProber {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl MediaProber {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub async fn probe(&self, path: &Path) -> MediaResult<SourceProbe> {
        let metadata = fs::metadata(path).await.map_err(|source| MediaError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let size_bytes = metadata.len();

        match self.run_ffprobe(path).await? {
            Some(data) => Ok(self.probe_from_ffprobe(&data, size_bytes)),
            None => {
                tracing::warn!(
                    target: "montage::ingest",
                    file = %path.display(),
                    "ffprobe unavailable, using stub probe"
                );
                Ok(Self::probe_from_stub(path, size_bytes))
            }
        }
    }

    async fn run_ffprobe(&self, path: &Path) -> MediaResult<Option<FfprobeOutput>> {
        let mut command = Command::new("ffprobe");
        command
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(path);
        let outcome = run_tool(self.executor.as_ref(), &mut command, self.timeout)
            .await
            .map_err(|source| MediaError::Io {
                source,
                path: path.to_path_buf(),
            })?;
        match outcome {
            ToolOutcome::Completed(output) if output.status.success() => {
                let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
                Ok(Some(parsed))
            }
            ToolOutcome::Completed(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(target: "montage::ingest", "ffprobe returned non-zero status: {stderr}");
                Ok(None)
            }
            ToolOutcome::Missing => Ok(None),
            ToolOutcome::TimedOut(limit) => Err(MediaError::Timeout(limit)),
        }
    }

    fn probe_from_ffprobe(&self, data: &FfprobeOutput, size_bytes: u64) -> SourceProbe {
        let video_stream = data
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"));
        let has_audio = data
            .streams
            .iter()
            .any(|stream| stream.codec_type.as_deref() == Some("audio"));
        let duration_seconds = data
            .format
            .duration
            .as_deref()
            .and_then(|value| value.parse::<f64>().ok());
        let container = data
            .format
            .format_name
            .as_deref()
            .and_then(|name| name.split(',').next())
            .map(|name| name.to_string());
        SourceProbe {
            analysis_source: "ffprobe".into(),
            container,
            duration_seconds,
            width: video_stream.and_then(|stream| stream.width),
            height: video_stream.and_then(|stream| stream.height),
            size_bytes,
            has_audio,
        }
    }

    fn probe_from_stub(path: &Path, size_bytes: u64) -> SourceProbe {
        let container = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        // Rough duration guess at ~1 MB per second of video.
        let duration = (size_bytes as f64 / 1_000_000.0).max(1.0);
        SourceProbe {
            analysis_source: "stub".into(),
            container,
            duration_seconds: Some(duration),
            width: None,
            height: None,
            size_bytes,
            has_audio: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}
