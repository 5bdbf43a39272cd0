use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AnalysisSection;
use crate::tool::{run_tool, CommandExecutor, ToolOutcome};

use super::error::{PlanError, PlanResult};
use super::models::{EmotionLabel, TimeRange};

const SPECTRUM_BINS: usize = 64;
const ANALYSIS_SLICE: usize = 2048;
const PITCH_MIN_HZ: f64 = 50.0;
const PITCH_MAX_HZ: f64 = 400.0;
const ENGAGEMENT_WEIGHT_RMS: f64 = 0.35;
const ENGAGEMENT_WEIGHT_CENTROID: f64 = 0.25;
const ENGAGEMENT_WEIGHT_ZCR: f64 = 0.20;
const ENGAGEMENT_WEIGHT_PITCH: f64 = 0.20;
const EMOTION_MARGIN: f64 = 0.02;

/// Per-window acoustic measurements. `start` is the window offset in
/// seconds from the beginning of the audio track.
#[derive(Debug, Clone, Copy)]
pub struct FrameFeatures {
    pub start: f64,
    pub rms: f64,
    pub zcr: f64,
    pub centroid: f64,
    pub pitch: f64,
}

/// Result of analyzing a mono PCM track. Ranges are in source seconds.
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    pub frames: Vec<FrameFeatures>,
    pub window_seconds: f64,
    pub duration: f64,
    pub emotion: EmotionLabel,
    pub engagement: Vec<f64>,
    pub silence_ranges: Vec<TimeRange>,
    pub speech_ranges: Vec<TimeRange>,
    pub dull_ranges: Vec<TimeRange>,
}

pub struct AnalysisEngine {
    executor: Arc<dyn CommandExecutor>,
    settings: AnalysisSection,
    timeout: Duration,
}

impl AnalysisEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: AnalysisSection) -> Self {
        let timeout = Duration::from_secs(settings.ffmpeg_timeout_seconds);
        Self {
            executor,
            settings,
            timeout,
        }
    }

    pub async fn analyze(&self, media: &Path) -> PlanResult<AudioAnalysis> {
        let samples = self.extract_samples(media).await?;
        Ok(self.analyze_samples(&samples))
    }

    /// Decodes the audio track to mono f32 PCM at the configured sample
    /// rate. A missing decoder is reported as `AnalysisUnavailable` so the
    /// caller can fall back to a minimal plan.
    pub async fn extract_samples(&self, media: &Path) -> PlanResult<Vec<f32>> {
        let mut command = Command::new("ffmpeg");
        command
            .arg("-v")
            .arg("quiet")
            .arg("-i")
            .arg(media)
            .arg("-f")
            .arg("f32le")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg(self.settings.sample_rate.to_string())
            .arg("pipe:1");
        let outcome = run_tool(self.executor.as_ref(), &mut command, self.timeout)
            .await
            .map_err(|source| PlanError::Io {
                source,
                path: media.to_path_buf(),
            })?;
        match outcome {
            ToolOutcome::Completed(output) if output.status.success() => {
                let samples = decode_f32le(&output.stdout);
                if samples.is_empty() {
                    return Err(PlanError::AnalysisUnavailable(
                        "decoder produced no audio samples".to_string(),
                    ));
                }
                debug!(
                    target: "montage::plan",
                    samples = samples.len(),
                    file = %media.display(),
                    "audio track decoded"
                );
                Ok(samples)
            }
            ToolOutcome::Completed(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(target: "montage::plan", "ffmpeg decode failed: {stderr}");
                Err(PlanError::AnalysisUnavailable(format!(
                    "audio decode failed for {}",
                    media.display()
                )))
            }
            ToolOutcome::Missing => Err(PlanError::AnalysisUnavailable(
                "ffmpeg not found on this host".to_string(),
            )),
            ToolOutcome::TimedOut(limit) => Err(PlanError::Timeout(limit)),
        }
    }

    pub fn analyze_samples(&self, samples: &[f32]) -> AudioAnalysis {
        let sample_rate = self.settings.sample_rate as f64;
        let window = ((self.settings.window_seconds * sample_rate) as usize).max(1);
        let duration = samples.len() as f64 / sample_rate;

        let mut frames = Vec::with_capacity(samples.len() / window + 1);
        let mut offset = 0usize;
        while offset < samples.len() {
            let end = (offset + window).min(samples.len());
            let chunk = &samples[offset..end];
            frames.push(measure_window(
                chunk,
                offset as f64 / sample_rate,
                sample_rate,
            ));
            offset = end;
        }

        let engagement = self.engagement_curve(&frames);
        let silence_ranges = self.silence_ranges(&frames, duration);
        let speech_ranges = complement_ranges(&silence_ranges, duration);
        let dull_ranges = self.dull_ranges(&frames, &engagement, &silence_ranges, duration);
        let emotion = classify_emotion(&frames);

        AudioAnalysis {
            frames,
            window_seconds: self.settings.window_seconds,
            duration,
            emotion,
            engagement,
            silence_ranges,
            speech_ranges,
            dull_ranges,
        }
    }

    /// Weighted, normalized, smoothed per-frame engagement in 0..1.
    fn engagement_curve(&self, frames: &[FrameFeatures]) -> Vec<f64> {
        if frames.is_empty() {
            return Vec::new();
        }
        let rms = normalize(frames.iter().map(|f| f.rms).collect());
        let centroid = normalize(frames.iter().map(|f| f.centroid).collect());
        let zcr = normalize(frames.iter().map(|f| f.zcr).collect());
        let pitch = normalize(frames.iter().map(|f| f.pitch).collect());
        let raw: Vec<f64> = (0..frames.len())
            .map(|i| {
                ENGAGEMENT_WEIGHT_RMS * rms[i]
                    + ENGAGEMENT_WEIGHT_CENTROID * centroid[i]
                    + ENGAGEMENT_WEIGHT_ZCR * zcr[i]
                    + ENGAGEMENT_WEIGHT_PITCH * pitch[i]
            })
            .collect();
        smooth(&raw, self.settings.smoothing_window.max(1))
    }

    fn silence_ranges(&self, frames: &[FrameFeatures], duration: f64) -> Vec<TimeRange> {
        let threshold = self.settings.silence_rms_threshold;
        let window = self.settings.window_seconds;
        let mut ranges = Vec::new();
        let mut run_start: Option<f64> = None;
        for frame in frames {
            if frame.rms < threshold {
                run_start.get_or_insert(frame.start);
            } else if let Some(start) = run_start.take() {
                ranges.push(TimeRange::new(start, frame.start));
            }
        }
        if let Some(start) = run_start {
            ranges.push(TimeRange::new(start, duration));
        }
        let kept: Vec<TimeRange> = ranges
            .into_iter()
            .filter(|range| range.duration() >= self.settings.min_silence_seconds)
            .map(|range| clamp_range(range, duration))
            .filter(TimeRange::is_well_formed)
            .collect();
        merge_ranges(kept, window * 0.5, 0.0)
    }

    /// Low-engagement stretches that are not already silence. The cut
    /// threshold adapts to how flat the curve is, and relaxes once when
    /// nothing clears the first pass.
    fn dull_ranges(
        &self,
        frames: &[FrameFeatures],
        engagement: &[f64],
        silence: &[TimeRange],
        duration: f64,
    ) -> Vec<TimeRange> {
        if engagement.is_empty() {
            return Vec::new();
        }
        let std = std_dev(engagement);
        let primary = if std < 0.15 { 25.0 } else { 40.0 };
        let ranges = self.dull_ranges_at(frames, engagement, silence, duration, primary);
        if !ranges.is_empty() {
            return ranges;
        }
        self.dull_ranges_at(frames, engagement, silence, duration, 15.0)
    }

    fn dull_ranges_at(
        &self,
        frames: &[FrameFeatures],
        engagement: &[f64],
        silence: &[TimeRange],
        duration: f64,
        percentile_cut: f64,
    ) -> Vec<TimeRange> {
        let threshold = percentile(engagement, percentile_cut);
        let window = self.settings.window_seconds;
        let mut raw = Vec::new();
        for (frame, score) in frames.iter().zip(engagement) {
            if *score >= threshold {
                continue;
            }
            let range = clamp_range(TimeRange::new(frame.start, frame.start + window), duration);
            if !range.is_well_formed() {
                continue;
            }
            if silence.iter().any(|s| overlaps(s, &range)) {
                continue;
            }
            raw.push(range);
        }
        merge_ranges(
            raw,
            self.settings.merge_gap_seconds,
            self.settings.min_segment_seconds,
        )
    }
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .filter(|sample| sample.is_finite())
        .collect()
}

fn measure_window(chunk: &[f32], start: f64, sample_rate: f64) -> FrameFeatures {
    let slice = &chunk[..chunk.len().min(ANALYSIS_SLICE)];
    FrameFeatures {
        start,
        rms: rms(chunk),
        zcr: zero_crossing_rate(chunk),
        centroid: spectral_centroid(slice, sample_rate),
        pitch: pitch_estimate(slice, sample_rate),
    }
}

fn rms(chunk: &[f32]) -> f64 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum: f64 = chunk.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / chunk.len() as f64).sqrt()
}

fn zero_crossing_rate(chunk: &[f32]) -> f64 {
    if chunk.len() < 2 {
        return 0.0;
    }
    let crossings = chunk
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / (chunk.len() - 1) as f64
}

/// Coarse DFT over a fixed bin count. Resolution is deliberately low, the
/// centroid only has to separate bright speech from flat rumble.
fn spectral_centroid(slice: &[f32], sample_rate: f64) -> f64 {
    if slice.len() < 2 {
        return 0.0;
    }
    let nyquist = sample_rate / 2.0;
    let mut weighted = 0.0;
    let mut total = 0.0;
    for bin in 1..SPECTRUM_BINS {
        let freq = bin as f64 * nyquist / SPECTRUM_BINS as f64;
        let omega = 2.0 * PI * freq / sample_rate;
        let mut re = 0.0;
        let mut im = 0.0;
        for (n, sample) in slice.iter().enumerate() {
            let phase = omega * n as f64;
            re += *sample as f64 * phase.cos();
            im -= *sample as f64 * phase.sin();
        }
        let magnitude = (re * re + im * im).sqrt();
        weighted += freq * magnitude;
        total += magnitude;
    }
    if total <= f64::EPSILON {
        0.0
    } else {
        weighted / total
    }
}

/// Autocorrelation peak over the voiced range. Returns 0 when the window
/// is too quiet or no lag stands out.
fn pitch_estimate(slice: &[f32], sample_rate: f64) -> f64 {
    let min_lag = (sample_rate / PITCH_MAX_HZ) as usize;
    let max_lag = (sample_rate / PITCH_MIN_HZ) as usize;
    if slice.len() <= max_lag * 2 || min_lag == 0 {
        return 0.0;
    }
    let energy: f64 = slice.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    if energy <= f64::EPSILON {
        return 0.0;
    }
    let mut best_lag = 0usize;
    let mut best_score = 0.0;
    for lag in min_lag..=max_lag {
        let mut score = 0.0;
        for i in 0..slice.len() - lag {
            score += slice[i] as f64 * slice[i + lag] as f64;
        }
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    if best_lag == 0 || best_score / energy < 0.3 {
        return 0.0;
    }
    sample_rate / best_lag as f64
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || (max - min) <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.into_iter().map(|v| (v - min) / (max - min)).collect()
}

fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window <= 1 {
        return values.to_vec();
    }
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn percentile(values: &[f64], cut: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (cut / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn clamp_range(range: TimeRange, duration: f64) -> TimeRange {
    TimeRange::new(range.start.max(0.0), range.end.min(duration))
}

fn overlaps(a: &TimeRange, b: &TimeRange) -> bool {
    a.start < b.end && b.start < a.end
}

/// Merges ranges whose gap is below `gap`, then drops merged ranges shorter
/// than `min_len`. Input order does not matter.
pub fn merge_ranges(mut ranges: Vec<TimeRange>, gap: f64, min_len: f64) -> Vec<TimeRange> {
    if ranges.is_empty() {
        return ranges;
    }
    ranges.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start - last.end <= gap => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
        .into_iter()
        .filter(|range| range.duration() >= min_len)
        .collect()
}

/// Complement of `ranges` over `[0, duration)`. Assumes the input is sorted
/// and non-overlapping, which `merge_ranges` guarantees.
pub fn complement_ranges(ranges: &[TimeRange], duration: f64) -> Vec<TimeRange> {
    let mut cursor = 0.0;
    let mut out = Vec::new();
    for range in ranges {
        if range.start > cursor {
            out.push(TimeRange::new(cursor, range.start));
        }
        cursor = cursor.max(range.end);
    }
    if duration > cursor {
        out.push(TimeRange::new(cursor, duration));
    }
    out.into_iter().filter(TimeRange::is_well_formed).collect()
}

fn classify_emotion(frames: &[FrameFeatures]) -> EmotionLabel {
    if frames.is_empty() {
        return EmotionLabel::Default;
    }
    let n = frames.len() as f64;
    let rms = frames.iter().map(|f| f.rms).sum::<f64>() / n;
    let zcr = frames.iter().map(|f| f.zcr).sum::<f64>() / n;
    let centroid = frames.iter().map(|f| f.centroid).sum::<f64>() / n;
    let voiced: Vec<f64> = frames.iter().map(|f| f.pitch).filter(|p| *p > 0.0).collect();
    let pitch = if voiced.is_empty() {
        0.0
    } else {
        voiced.iter().sum::<f64>() / voiced.len() as f64
    };

    if rms < 0.01 {
        return EmotionLabel::Silent;
    }

    let mut candidates: Vec<(EmotionLabel, f64)> = Vec::new();
    if rms > 0.15 && centroid > 2500.0 && pitch > 200.0 {
        candidates.push((EmotionLabel::Excited, rms - 0.15 + (pitch - 200.0) / 1000.0));
    }
    if rms > 0.10 && pitch > 150.0 {
        candidates.push((EmotionLabel::Happy, rms - 0.10 + (pitch - 150.0) / 1000.0));
    }
    if rms > 0.12 && zcr > 0.1 {
        candidates.push((EmotionLabel::Angry, rms - 0.12 + zcr - 0.1));
    }
    if rms < 0.08 && pitch < 150.0 {
        candidates.push((EmotionLabel::Sad, 0.08 - rms));
    }
    if zcr < 0.05 && pitch < 100.0 {
        candidates.push((EmotionLabel::Monotone, 0.05 - zcr));
    }
    if (0.05..=0.12).contains(&rms) {
        candidates.push((EmotionLabel::Calm, 0.12 - (rms - 0.085).abs()));
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    match candidates.as_slice() {
        [] => EmotionLabel::Neutral,
        [(label, _)] => *label,
        [(first, s1), (_, s2), ..] => {
            if (s1 - s2).abs() < EMOTION_MARGIN {
                EmotionLabel::Default
            } else {
                *first
            }
        }
    }
}
