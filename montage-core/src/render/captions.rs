use std::path::Path;

use tokio::fs;

use crate::executor::CaptionTrack;
use crate::plan::{CaptionCue, CaptionStyle};

use super::error::{RenderError, RenderResult};

const PLACEHOLDER_TEXT: &str = "[speech]";

/// `HH:MM:SS,mmm`, the comma is what distinguishes SRT from WebVTT.
pub fn format_srt_time(seconds: f64) -> String {
    format_clock(seconds, ',')
}

/// `HH:MM:SS.mmm` with a dot, as WebVTT requires.
pub fn format_vtt_time(seconds: f64) -> String {
    format_clock(seconds, '.')
}

fn format_clock(seconds: f64, separator: char) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}{separator}{millis:03}")
}

fn cue_text(cue: &CaptionCue, style: CaptionStyle) -> String {
    let text = cue.text.as_deref().unwrap_or(PLACEHOLDER_TEXT);
    match style {
        CaptionStyle::Standard => text.to_string(),
        CaptionStyle::Bold => format!("<b>{text}</b>"),
    }
}

pub fn render_srt(track: &CaptionTrack) -> String {
    let mut out = String::new();
    for (index, cue) in track.cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue_text(cue, track.style)
        ));
    }
    out
}

pub fn render_vtt(track: &CaptionTrack) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in &track.cues {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            format_vtt_time(cue.start),
            format_vtt_time(cue.end),
            cue_text(cue, track.style)
        ));
    }
    out
}

pub async fn write_srt(track: &CaptionTrack, path: &Path) -> RenderResult<()> {
    fs::write(path, render_srt(track))
        .await
        .map_err(|source| RenderError::Io {
            source,
            path: path.to_path_buf(),
        })
}

pub async fn write_vtt(track: &CaptionTrack, path: &Path) -> RenderResult<()> {
    fs::write(path, render_vtt(track))
        .await
        .map_err(|source| RenderError::Io {
            source,
            path: path.to_path_buf(),
        })
}
