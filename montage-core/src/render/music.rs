use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::MusicSection;
use crate::executor::MusicBed;
use crate::plan::MusicMood;

use super::error::{RenderError, RenderResult};

const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "m4a", "aac", "flac", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainPoint {
    pub at: f64,
    pub gain: f32,
}

/// Mix instructions for one output. Written as a JSON sidecar so the mix is
/// reproducible even when the encode itself ran as a stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicMixPlan {
    pub mood: MusicMood,
    pub bed_path: Option<PathBuf>,
    pub volume: f32,
    pub duck_gain: f32,
    pub fade_seconds: f64,
    pub envelope: Vec<GainPoint>,
}

/// Picks a music bed from the library and lays out the gain envelope that
/// ducks it under speech.
pub struct MusicSelector {
    music_dir: PathBuf,
    settings: MusicSection,
}

impl MusicSelector {
    pub fn new(music_dir: impl Into<PathBuf>, settings: MusicSection) -> Self {
        Self {
            music_dir: music_dir.into(),
            settings,
        }
    }

    pub fn plan_mix(&self, bed: &MusicBed, final_duration: f64) -> MusicMixPlan {
        let bed_path = self.select_bed(bed.mood);
        if bed_path.is_none() {
            debug!(
                target: "montage::render",
                mood = %bed.mood,
                dir = %self.music_dir.display(),
                "no music bed available, mix plan records intent only"
            );
        }
        let fade_seconds = f64::from(self.settings.fade_ms) / 1000.0;
        MusicMixPlan {
            mood: bed.mood,
            bed_path,
            volume: bed.volume,
            duck_gain: self.settings.duck_gain,
            fade_seconds,
            envelope: self.envelope(bed, final_duration, fade_seconds),
        }
    }

    /// Tracks tagged with the mood in their file name or parent directory
    /// win, any library track is the fallback. Ties break randomly so
    /// repeated jobs do not all pick the same bed.
    fn select_bed(&self, mood: MusicMood) -> Option<PathBuf> {
        let mut matching = Vec::new();
        let mut any = Vec::new();
        for entry in WalkDir::new(&self.music_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            let path = entry.path();
            if !path.is_file() || !has_audio_extension(path) {
                continue;
            }
            let haystack = path
                .strip_prefix(&self.music_dir)
                .unwrap_or(path)
                .to_string_lossy()
                .to_ascii_lowercase();
            if haystack.contains(mood.as_str()) {
                matching.push(path.to_path_buf());
            }
            any.push(path.to_path_buf());
        }
        let pool = if matching.is_empty() { any } else { matching };
        pool.choose(&mut rand::thread_rng()).cloned()
    }

    fn envelope(&self, bed: &MusicBed, duration: f64, fade: f64) -> Vec<GainPoint> {
        let base = bed.volume;
        let ducked = bed.volume * self.settings.duck_gain;
        let mut points = vec![GainPoint { at: 0.0, gain: base }];
        for window in &bed.duck {
            let start = window.start.min(duration);
            let end = window.end.min(duration);
            if end <= start {
                continue;
            }
            points.push(GainPoint {
                at: (start - fade).max(0.0),
                gain: base,
            });
            points.push(GainPoint { at: start, gain: ducked });
            points.push(GainPoint { at: end, gain: ducked });
            points.push(GainPoint {
                at: (end + fade).min(duration),
                gain: base,
            });
        }
        points.push(GainPoint {
            at: duration,
            gain: 0.0,
        });
        points.sort_by(|a, b| a.at.partial_cmp(&b.at).unwrap_or(std::cmp::Ordering::Equal));
        points.dedup_by(|a, b| (a.at - b.at).abs() < 1e-9 && (a.gain - b.gain).abs() < 1e-6);
        points
    }
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub async fn write_mix_plan(plan: &MusicMixPlan, path: &Path) -> RenderResult<()> {
    let payload = serde_json::to_string_pretty(plan)?;
    fs::write(path, payload)
        .await
        .map_err(|source| RenderError::Io {
            source,
            path: path.to_path_buf(),
        })
}
