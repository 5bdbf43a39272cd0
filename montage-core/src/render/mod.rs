mod captions;
mod error;
mod music;
mod profiles;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageBuffer, Rgb};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::MontageConfig;
use crate::executor::{CaptionTrack, ExecutionOutcome, Segment};
use crate::plan::CaptionCue;
use crate::project::Project;
use crate::tool::{run_tool, CommandExecutor, SystemCommandExecutor, ToolOutcome};

pub use captions::{
    format_srt_time, format_vtt_time, render_srt, render_vtt, write_srt, write_vtt,
};
pub use error::{RenderError, RenderResult};
pub use music::{write_mix_plan, GainPoint, MusicMixPlan, MusicSelector};
pub use profiles::{AspectRatio, Platform, PlatformProfile, UnknownPlatform};

/// One finished output. `stub` marks artifacts produced without an encoder
/// on the host, they carry real metadata but placeholder payloads.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub platform: Platform,
    pub profile: String,
    pub output_path: PathBuf,
    pub preview_path: PathBuf,
    pub captions_path: Option<PathBuf>,
    pub checksum: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub stub: bool,
}

/// Per-platform result. A failed platform never takes down its siblings.
#[derive(Debug)]
pub struct PlatformRenderOutcome {
    pub platform: Platform,
    pub result: RenderResult<RenderedArtifact>,
}

/// Renders the executed timeline once per requested platform, concurrently.
/// Every output gets a checksum sidecar, a preview frame, and caption files
/// when the plan produced a track.
pub struct PlatformRenderer {
    config: Arc<MontageConfig>,
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl PlatformRenderer {
    pub fn new(config: Arc<MontageConfig>) -> Self {
        Self::with_executor(config, Arc::new(SystemCommandExecutor))
    }

    pub fn with_executor(config: Arc<MontageConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        let timeout = Duration::from_secs(config.render.ffmpeg_timeout_seconds);
        Self {
            config,
            executor,
            timeout,
        }
    }

    pub async fn render_all(
        &self,
        project: &Project,
        outcome: &ExecutionOutcome,
        output_dir: &Path,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> RenderResult<Vec<PlatformRenderOutcome>> {
        fs::create_dir_all(output_dir)
            .await
            .map_err(|source| RenderError::Io {
                source,
                path: output_dir.to_path_buf(),
            })?;
        let total = project.platforms.len();
        let completed = AtomicUsize::new(0);
        let tasks = project.platforms.iter().map(|platform| {
            let completed = &completed;
            async move {
                let result = self
                    .render_platform(project, outcome, output_dir, platform.profile())
                    .await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                if let Err(err) = &result {
                    warn!(
                        target: "montage::render",
                        platform = %platform,
                        error = %err,
                        "platform render failed"
                    );
                }
                PlatformRenderOutcome {
                    platform: *platform,
                    result,
                }
            }
        });
        Ok(futures::future::join_all(tasks).await)
    }

    async fn render_platform(
        &self,
        project: &Project,
        outcome: &ExecutionOutcome,
        output_dir: &Path,
        profile: PlatformProfile,
    ) -> RenderResult<RenderedArtifact> {
        let duration = profile.capped_duration(outcome.final_duration);
        let output_path = output_dir.join(profile.output_file_name());

        let captions_path = match &outcome.captions {
            Some(track) => {
                let clamped = clamp_track(track, duration, self.config.captions.min_cue_seconds);
                let srt_path = output_dir.join(format!("{}.srt", profile.label));
                let vtt_path = output_dir.join(format!("{}.vtt", profile.label));
                write_srt(&clamped, &srt_path).await?;
                write_vtt(&clamped, &vtt_path).await?;
                Some(srt_path)
            }
            None => None,
        };

        let mix_plan = match &outcome.music {
            Some(bed) => {
                let selector = MusicSelector::new(
                    self.config.resolve_path(&self.config.paths.music_dir),
                    self.config.music.clone(),
                );
                let plan = selector.plan_mix(bed, duration);
                let mix_path = output_dir.join(format!("{}_mix.json", profile.label));
                write_mix_plan(&plan, &mix_path).await?;
                Some(plan)
            }
            None => None,
        };

        let stub = self
            .encode(project, outcome, &profile, duration, mix_plan.as_ref(), &output_path)
            .await?;

        let checksum = compute_sha256(&output_path).await?;
        let sidecar = output_path.with_extension("mp4.sha256");
        let file_name = output_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        fs::write(&sidecar, format!("{checksum}  {file_name}\n"))
            .await
            .map_err(|source| RenderError::Io {
                source,
                path: sidecar.clone(),
            })?;

        let preview_path = output_dir.join(format!("{}_preview.png", profile.label));
        self.capture_preview(&output_path, &preview_path, stub).await?;

        let metadata = fs::metadata(&output_path)
            .await
            .map_err(|source| RenderError::Io {
                source,
                path: output_path.clone(),
            })?;

        info!(
            target: "montage::render",
            project_id = %project.project_id,
            platform = %profile.platform,
            output = %output_path.display(),
            duration = format!("{duration:.2}"),
            stub,
            "platform rendered"
        );
        Ok(RenderedArtifact {
            platform: profile.platform,
            profile: profile.label.to_string(),
            output_path,
            preview_path,
            captions_path,
            checksum,
            size_bytes: metadata.len(),
            duration_seconds: duration,
            stub,
        })
    }

    /// Runs the encode, falling back to a stub artifact when no encoder is
    /// installed. Returns whether the stub path was taken.
    async fn encode(
        &self,
        project: &Project,
        outcome: &ExecutionOutcome,
        profile: &PlatformProfile,
        duration: f64,
        mix: Option<&MusicMixPlan>,
        output_path: &Path,
    ) -> RenderResult<bool> {
        let args = self.encode_args(
            &project.source_path,
            outcome.timeline.segments(),
            profile,
            duration,
            mix,
            output_path,
        );
        let mut command = Command::new("ffmpeg");
        command.args(&args);
        let run = run_tool(self.executor.as_ref(), &mut command, self.timeout)
            .await
            .map_err(|source| RenderError::Io {
                source,
                path: output_path.to_path_buf(),
            })?;
        match run {
            ToolOutcome::Completed(output) if output.status.success() => Ok(false),
            ToolOutcome::Completed(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(RenderError::Encode {
                    platform: profile.platform.to_string(),
                    detail: stderr.trim().to_string(),
                })
            }
            ToolOutcome::Missing => {
                warn!(
                    target: "montage::render",
                    platform = %profile.platform,
                    "ffmpeg unavailable, writing stub artifact"
                );
                self.write_render_stub(outcome, profile, duration, output_path)
                    .await?;
                Ok(true)
            }
            ToolOutcome::TimedOut(limit) => Err(RenderError::Timeout(limit)),
        }
    }

    fn encode_args(
        &self,
        source: &Path,
        segments: &[Segment],
        profile: &PlatformProfile,
        duration: f64,
        mix: Option<&MusicMixPlan>,
        output_path: &Path,
    ) -> Vec<String> {
        let render = &self.config.render;
        let mut filter = String::new();
        for (index, segment) in segments.iter().enumerate() {
            filter.push_str(&format!(
                "[0:v]trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS[v{index}];",
                segment.source_start, segment.source_end
            ));
            filter.push_str(&format!(
                "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS[a{index}];",
                segment.source_start, segment.source_end
            ));
        }
        for index in 0..segments.len() {
            filter.push_str(&format!("[v{index}][a{index}]"));
        }
        filter.push_str(&format!(
            "concat=n={}:v=1:a=1[vc][ac];",
            segments.len()
        ));
        filter.push_str(&format!(
            "[vc]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}[vout];",
            w = profile.width,
            h = profile.height
        ));
        let bed = mix.and_then(|plan| plan.bed_path.as_deref());
        match (bed, mix) {
            (Some(_), Some(plan)) => {
                filter.push_str(&format!(
                    "[1:a]volume={:.3},afade=t=in:d={:.3}[bed];[ac][bed]amix=inputs=2:duration=first[aout]",
                    plan.volume, plan.fade_seconds
                ));
            }
            _ => filter.push_str("[ac]anull[aout]"),
        }

        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.display().to_string(),
        ];
        if let Some(bed_path) = bed {
            args.push("-i".to_string());
            args.push(bed_path.display().to_string());
        }
        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
            "-c:v".to_string(),
            render.video_codec.clone(),
            "-preset".to_string(),
            render.preset.clone(),
            "-crf".to_string(),
            render.crf.to_string(),
            "-b:a".to_string(),
            render.audio_bitrate.clone(),
            "-t".to_string(),
            format!("{duration:.3}"),
            output_path.display().to_string(),
        ]);
        args
    }

    async fn write_render_stub(
        &self,
        outcome: &ExecutionOutcome,
        profile: &PlatformProfile,
        duration: f64,
        path: &Path,
    ) -> RenderResult<()> {
        let mut buffer = format!(
            "RENDER-STUB {} {}x{} duration={duration:.3}\n",
            profile.label, profile.width, profile.height
        );
        for (index, segment) in outcome.timeline.segments().iter().enumerate() {
            buffer.push_str(&format!(
                "# {index} {:.3}..{:.3}\n",
                segment.source_start, segment.source_end
            ));
        }
        fs::write(path, buffer)
            .await
            .map_err(|source| RenderError::Io {
                source,
                path: path.to_path_buf(),
            })
    }

    /// Grabs one frame from the output for the preview. Stub artifacts and
    /// hosts without ffmpeg get a generated placeholder instead.
    async fn capture_preview(
        &self,
        output_path: &Path,
        preview_path: &Path,
        stub: bool,
    ) -> RenderResult<()> {
        if !stub {
            let mut command = Command::new("ffmpeg");
            command
                .arg("-y")
                .arg("-hide_banner")
                .arg("-loglevel")
                .arg("error")
                .arg("-i")
                .arg(output_path)
                .arg("-frames:v")
                .arg("1")
                .arg("-vf")
                .arg("scale=640:-1")
                .arg(preview_path);
            let run = run_tool(self.executor.as_ref(), &mut command, self.timeout)
                .await
                .map_err(|source| RenderError::Io {
                    source,
                    path: preview_path.to_path_buf(),
                })?;
            if let ToolOutcome::Completed(output) = run {
                if output.status.success() {
                    return Ok(());
                }
            }
        }
        write_placeholder_frame(preview_path)
    }
}

fn clamp_track(track: &CaptionTrack, duration: f64, min_cue: f64) -> CaptionTrack {
    let cues = track
        .cues
        .iter()
        .filter(|cue| cue.start < duration)
        .map(|cue| CaptionCue {
            start: cue.start,
            end: cue.end.min(duration),
            text: cue.text.clone(),
        })
        .filter(|cue| cue.end - cue.start >= min_cue)
        .collect();
    CaptionTrack {
        style: track.style,
        sync: track.sync,
        cues,
    }
}

fn write_placeholder_frame(path: &Path) -> RenderResult<()> {
    let mut buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(320, 180);
    for (x, y, pixel) in buffer.enumerate_pixels_mut() {
        let fx = x as f32 / 320.0;
        let fy = y as f32 / 180.0;
        *pixel = Rgb([
            (24.0 + 90.0 * fx) as u8,
            (24.0 + 60.0 * fy) as u8,
            (40.0 + 70.0 * (1.0 - fx)) as u8,
        ]);
    }
    buffer.save(path)?;
    Ok(())
}

async fn compute_sha256(path: &Path) -> RenderResult<String> {
    let bytes = fs::read(path).await.map_err(|source| RenderError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Output;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::config::load_montage_config;
    use crate::executor::Timeline;
    use crate::plan::{CaptionStyle, TimeRange};

    struct MissingTool;

    #[async_trait]
    impl CommandExecutor for MissingTool {
        async fn run(&self, _command: &mut Command) -> std::io::Result<Output> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "not installed",
            ))
        }
    }

    fn fixture_config() -> Arc<MontageConfig> {
        let path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/montage.toml");
        Arc::new(load_montage_config(path).expect("fixture config"))
    }

    fn test_project(platforms: Vec<Platform>) -> Project {
        Project {
            project_id: "prj-render".to_string(),
            source_path: PathBuf::from("/tmp/source.mp4"),
            original_name: "source.mp4".to_string(),
            container: Some("mp4".to_string()),
            size_bytes: 2048,
            duration_seconds: Some(90.0),
            platforms,
            created_at: Utc::now(),
        }
    }

    fn outcome_of(duration: f64, staging: &Path) -> ExecutionOutcome {
        ExecutionOutcome {
            timeline: Timeline::from_duration(duration),
            final_duration: duration,
            removed_seconds: 0.0,
            captions: Some(CaptionTrack {
                style: CaptionStyle::Standard,
                sync: true,
                cues: vec![CaptionCue {
                    start: 0.5,
                    end: 4.0,
                    text: Some("hello there".to_string()),
                }],
            }),
            music: None,
            decision_path: staging.join("edit_decision.json"),
        }
    }

    #[tokio::test]
    async fn stub_render_produces_artifact_checksum_and_preview() {
        let output = TempDir::new().unwrap();
        let renderer =
            PlatformRenderer::with_executor(fixture_config(), Arc::new(MissingTool));
        let project = test_project(vec![Platform::Youtube]);
        let outcome = outcome_of(42.0, output.path());
        let results = renderer
            .render_all(&project, &outcome, output.path(), &|_, _| {})
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let artifact = results[0].result.as_ref().unwrap();
        assert!(artifact.stub);
        assert!(artifact.output_path.ends_with("youtube_16x9.mp4"));
        let contents = std::fs::read_to_string(&artifact.output_path).unwrap();
        assert!(contents.starts_with("RENDER-STUB youtube_16x9"));
        assert_eq!(artifact.checksum.len(), 64);
        assert!(artifact.preview_path.exists());
        let sidecar = artifact.output_path.with_extension("mp4.sha256");
        assert!(sidecar.exists());
        let captions = artifact.captions_path.as_ref().unwrap();
        assert!(std::fs::read_to_string(captions)
            .unwrap()
            .contains("hello there"));
    }

    #[tokio::test]
    async fn platform_caps_trim_the_rendered_duration() {
        let output = TempDir::new().unwrap();
        let renderer =
            PlatformRenderer::with_executor(fixture_config(), Arc::new(MissingTool));
        let project = test_project(vec![Platform::Tiktok, Platform::Youtube]);
        let outcome = outcome_of(90.0, output.path());
        let results = renderer
            .render_all(&project, &outcome, output.path(), &|_, _| {})
            .await
            .unwrap();
        for entry in &results {
            let artifact = entry.result.as_ref().unwrap();
            match entry.platform {
                Platform::Tiktok => assert!((artifact.duration_seconds - 60.0).abs() < 1e-9),
                Platform::Youtube => assert!((artifact.duration_seconds - 90.0).abs() < 1e-9),
                Platform::Instagram => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn progress_reports_each_completed_platform() {
        let output = TempDir::new().unwrap();
        let renderer =
            PlatformRenderer::with_executor(fixture_config(), Arc::new(MissingTool));
        let project = test_project(vec![Platform::Youtube, Platform::Instagram]);
        let outcome = outcome_of(30.0, output.path());
        let seen = std::sync::Mutex::new(Vec::new());
        renderer
            .render_all(&project, &outcome, output.path(), &|done, total| {
                seen.lock().unwrap().push((done, total));
            })
            .await
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&(2, 2)));
    }

    #[test]
    fn encode_args_cover_trim_concat_and_reframe() {
        let renderer =
            PlatformRenderer::with_executor(fixture_config(), Arc::new(MissingTool));
        let mut timeline = Timeline::from_duration(10.0);
        timeline.cut(&[TimeRange::new(2.0, 4.0)]).unwrap();
        let profile = Platform::Instagram.profile();
        let args = renderer.encode_args(
            Path::new("/tmp/in.mp4"),
            timeline.segments(),
            &profile,
            8.0,
            None,
            Path::new("/tmp/out.mp4"),
        );
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("trim=start=0.000:end=2.000"));
        assert!(filter.contains("concat=n=2:v=1:a=1"));
        assert!(filter.contains("scale=1080:1920"));
        assert!(filter.contains("crop=1080:1920"));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "8.000"));
    }
}
