use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MontageConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    pub ingest: IngestSection,
    pub analysis: AnalysisSection,
    pub render: RenderSection,
    pub music: MusicSection,
    pub captions: CaptionSection,
    pub jobs: JobsSection,
}

impl MontageConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub media_dir: String,
    pub output_dir: String,
    pub music_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    pub max_upload_mb: u64,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSection {
    pub sample_rate: u32,
    pub window_seconds: f64,
    pub silence_rms_threshold: f64,
    pub min_silence_seconds: f64,
    pub smoothing_window: usize,
    pub merge_gap_seconds: f64,
    pub min_segment_seconds: f64,
    pub ffmpeg_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    pub ffmpeg_timeout_seconds: u64,
    pub default_platforms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MusicSection {
    pub default_volume: f32,
    pub duck_gain: f32,
    pub fade_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionSection {
    pub style: String,
    pub min_cue_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    pub max_attempts: u32,
    pub retry_delay_seconds: [u32; 2],
    pub stall_timeout_seconds: u64,
}

pub fn load_montage_config<P: AsRef<Path>>(path: P) -> Result<MontageConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
