mod error;
mod timeline;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::MontageConfig;
use crate::plan::{CaptionCue, EditPlan, Operation};
use crate::project::Project;

pub use error::{ExecutorError, ExecutorResult};
pub use timeline::{Segment, Timeline};
pub use types::{AppliedStep, CaptionTrack, EditDecision, MusicBed, RetryPolicy, StagingPaths};

const EPSILON: f64 = 1e-6;
const PROGRESS_START: u8 = 20;
const PROGRESS_SPAN: u8 = 40;

/// Result of applying a plan. Everything downstream of the executor works
/// in final timeline coordinates.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub timeline: Timeline,
    pub final_duration: f64,
    pub removed_seconds: f64,
    pub captions: Option<CaptionTrack>,
    pub music: Option<MusicBed>,
    pub decision_path: PathBuf,
}

/// Applies plan operations in order against an evolving timeline. The
/// executor never touches pixels, it settles WHAT the renderer will cut,
/// caption and mix, and leaves an audit trail in the staging logs.
pub struct EditExecutor {
    config: Arc<MontageConfig>,
    retry: RetryPolicy,
}

impl EditExecutor {
    pub fn new(config: Arc<MontageConfig>) -> Self {
        let retry = RetryPolicy::from_config(&config.jobs);
        Self { config, retry }
    }

    pub async fn execute(
        &self,
        project: &Project,
        plan: &EditPlan,
        staging: &StagingPaths,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> ExecutorResult<ExecutionOutcome> {
        let source_duration = plan
            .source_duration
            .or(project.duration_seconds)
            .ok_or_else(|| {
                ExecutorError::PlanIntegrity("plan carries no source duration".to_string())
            })?;
        staging.prepare().await?;

        let mut timeline = Timeline::from_duration(source_duration);
        let mut removed_seconds = 0.0;
        let mut captions: Option<CaptionTrack> = None;
        let mut music: Option<MusicBed> = None;
        let mut applied = Vec::with_capacity(plan.operations.len());

        let total = plan.operations.len().max(1) as u32;
        for (index, operation) in plan.operations.iter().enumerate() {
            match operation {
                Operation::Trim { reason, ranges } => {
                    let removed = timeline.cut(ranges)?;
                    removed_seconds += removed;
                    applied.push(AppliedStep {
                        kind: operation.kind().to_string(),
                        detail: format!("{reason:?} removed {removed:.2}s in {} ranges", ranges.len()),
                    });
                }
                Operation::Reorder { order } => {
                    timeline.reorder(order)?;
                    applied.push(AppliedStep {
                        kind: operation.kind().to_string(),
                        detail: format!("segments rearranged to {order:?}"),
                    });
                }
                Operation::Caption { style, sync, cues } => {
                    let kept = self.validate_cues(cues, timeline.duration())?;
                    applied.push(AppliedStep {
                        kind: operation.kind().to_string(),
                        detail: format!("{} of {} cues kept", kept.len(), cues.len()),
                    });
                    captions = Some(CaptionTrack {
                        style: *style,
                        sync: *sync,
                        cues: kept,
                    });
                }
                Operation::Music { mood, volume, duck } => {
                    if !(0.0..=1.0).contains(volume) {
                        return Err(ExecutorError::PlanIntegrity(format!(
                            "music volume {volume} outside 0..1"
                        )));
                    }
                    let duration = timeline.duration();
                    for window in duck {
                        if !window.is_well_formed() || window.end > duration + EPSILON {
                            return Err(ExecutorError::PlanIntegrity(format!(
                                "duck window {:.3}..{:.3} outside timeline of {duration:.3}s",
                                window.start, window.end
                            )));
                        }
                    }
                    applied.push(AppliedStep {
                        kind: operation.kind().to_string(),
                        detail: format!("{mood} bed at {volume:.2}, {} duck windows", duck.len()),
                    });
                    music = Some(MusicBed {
                        mood: *mood,
                        volume: *volume,
                        duck: duck.clone(),
                    });
                }
                Operation::Reframe { platform, .. } => {
                    applied.push(AppliedStep {
                        kind: operation.kind().to_string(),
                        detail: format!("{platform} deferred to renderer"),
                    });
                }
            }
            let step = PROGRESS_START
                + (u32::from(PROGRESS_SPAN) * (index as u32 + 1) / total) as u8;
            progress(step);
        }

        if timeline.is_empty() {
            return Err(ExecutorError::PlanIntegrity(
                "plan removed the entire timeline".to_string(),
            ));
        }

        let final_duration = timeline.duration();
        let decision = EditDecision {
            plan_id: plan.plan_id.clone(),
            project_id: plan.project_id.clone(),
            source_duration,
            final_duration,
            removed_seconds,
            applied,
            created_at: Utc::now(),
        };
        let decision_path = staging.decision_path();
        self.write_decision(&decision, &decision_path).await?;

        info!(
            target: "montage::executor",
            plan_id = %plan.plan_id,
            final_duration = format!("{final_duration:.2}"),
            removed = format!("{removed_seconds:.2}"),
            segments = timeline.segments().len(),
            "plan applied"
        );
        Ok(ExecutionOutcome {
            timeline,
            final_duration,
            removed_seconds,
            captions,
            music,
            decision_path,
        })
    }

    /// Cues starting past the end of the timeline point at an inconsistent
    /// plan. Cues that merely run over the end get clamped, and anything
    /// shorter than the configured minimum is dropped.
    fn validate_cues(
        &self,
        cues: &[CaptionCue],
        duration: f64,
    ) -> ExecutorResult<Vec<CaptionCue>> {
        let min_cue = self.config.captions.min_cue_seconds;
        let mut kept = Vec::with_capacity(cues.len());
        for cue in cues {
            if cue.start < 0.0 || cue.end <= cue.start {
                return Err(ExecutorError::PlanIntegrity(format!(
                    "malformed caption cue {:.3}..{:.3}",
                    cue.start, cue.end
                )));
            }
            if cue.start >= duration - EPSILON {
                return Err(ExecutorError::PlanIntegrity(format!(
                    "caption cue starts at {:.3}s beyond final duration {duration:.3}s",
                    cue.start
                )));
            }
            let end = cue.end.min(duration);
            if end - cue.start < min_cue {
                continue;
            }
            kept.push(CaptionCue {
                start: cue.start,
                end,
                text: cue.text.clone(),
            });
        }
        Ok(kept)
    }

    async fn write_decision(
        &self,
        decision: &EditDecision,
        path: &std::path::Path,
    ) -> ExecutorResult<()> {
        let payload = serde_json::to_string_pretty(decision)?;
        let mut attempt = 1u32;
        loop {
            match tokio::fs::write(path, &payload).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.compute_delay(attempt);
                    warn!(
                        target: "montage::executor",
                        error = %source,
                        attempt,
                        "decision write failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(ExecutorError::Io {
                        source,
                        path: path.to_path_buf(),
                    })
                }
            }
        }
    }
}

/// Convenience for callers that do not report progress.
pub fn no_progress(_: u8) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::load_montage_config;
    use crate::plan::{
        CaptionStyle, EditPlan, EmotionLabel, MusicMood, PlanMode, TrimReason,
    };
    use crate::render::Platform;

    fn fixture_config() -> Arc<MontageConfig> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/montage.toml");
        Arc::new(load_montage_config(path).expect("fixture config"))
    }

    fn test_project(duration: f64) -> Project {
        Project {
            project_id: "prj-test".to_string(),
            source_path: PathBuf::from("/tmp/source.mp4"),
            original_name: "source.mp4".to_string(),
            container: Some("mp4".to_string()),
            size_bytes: 1024,
            duration_seconds: Some(duration),
            platforms: vec![Platform::Youtube],
            created_at: Utc::now(),
        }
    }

    fn plan_with(operations: Vec<Operation>, duration: f64) -> EditPlan {
        EditPlan::new(
            "prj-test",
            PlanMode::Auto,
            EmotionLabel::Neutral,
            operations,
            Some(duration),
        )
    }

    #[tokio::test]
    async fn execute_applies_operations_in_order() {
        let staging_dir = TempDir::new().unwrap();
        let staging = StagingPaths::new(staging_dir.path());
        let executor = EditExecutor::new(fixture_config());
        let plan = plan_with(
            vec![
                Operation::Trim {
                    reason: TrimReason::Silence,
                    ranges: vec![TimeRange::new(0.0, 2.0)],
                },
                Operation::Trim {
                    reason: TrimReason::Filler,
                    ranges: vec![TimeRange::new(0.0, 1.0)],
                },
                Operation::Caption {
                    style: CaptionStyle::Standard,
                    sync: true,
                    cues: vec![
                        CaptionCue {
                            start: 0.0,
                            end: 2.0,
                            text: Some("hello".to_string()),
                        },
                        CaptionCue {
                            start: 2.0,
                            end: 2.01,
                            text: None,
                        },
                    ],
                },
                Operation::Music {
                    mood: MusicMood::Upbeat,
                    volume: 0.15,
                    duck: vec![TimeRange::new(0.0, 3.0)],
                },
            ],
            10.0,
        );
        let outcome = executor
            .execute(&test_project(10.0), &plan, &staging, &no_progress)
            .await
            .unwrap();
        assert!((outcome.final_duration - 7.0).abs() < 1e-9);
        assert!((outcome.removed_seconds - 3.0).abs() < 1e-9);
        // The sub-minimum cue was dropped during validation.
        let captions = outcome.captions.unwrap();
        assert_eq!(captions.cues.len(), 1);
        assert!(outcome.music.is_some());
        let decision = EditDecision::load(&outcome.decision_path).await.unwrap();
        assert_eq!(decision.applied.len(), 4);
        assert!((decision.final_duration - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn progress_stays_inside_the_execution_band() {
        let staging_dir = TempDir::new().unwrap();
        let staging = StagingPaths::new(staging_dir.path());
        let executor = EditExecutor::new(fixture_config());
        let plan = plan_with(
            vec![
                Operation::Trim {
                    reason: TrimReason::Silence,
                    ranges: vec![TimeRange::new(0.0, 1.0)],
                },
                Operation::Music {
                    mood: MusicMood::Calm,
                    volume: 0.2,
                    duck: vec![],
                },
            ],
            8.0,
        );
        let seen = std::sync::Mutex::new(Vec::new());
        let record = |value: u8| seen.lock().unwrap().push(value);
        executor
            .execute(&test_project(8.0), &plan, &staging, &record)
            .await
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![40, 60]);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn emptying_the_timeline_is_an_integrity_failure() {
        let staging_dir = TempDir::new().unwrap();
        let staging = StagingPaths::new(staging_dir.path());
        let executor = EditExecutor::new(fixture_config());
        let plan = plan_with(
            vec![Operation::Trim {
                reason: TrimReason::Emotion,
                ranges: vec![TimeRange::new(0.0, 5.0)],
            }],
            5.0,
        );
        let err = executor
            .execute(&test_project(5.0), &plan, &staging, &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::PlanIntegrity(_)));
    }

    #[tokio::test]
    async fn caption_beyond_final_duration_is_rejected() {
        let staging_dir = TempDir::new().unwrap();
        let staging = StagingPaths::new(staging_dir.path());
        let executor = EditExecutor::new(fixture_config());
        let plan = plan_with(
            vec![Operation::Caption {
                style: CaptionStyle::Bold,
                sync: false,
                cues: vec![CaptionCue {
                    start: 9.0,
                    end: 10.0,
                    text: None,
                }],
            }],
            5.0,
        );
        let err = executor
            .execute(&test_project(5.0), &plan, &staging, &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::PlanIntegrity(_)));
    }
}
