use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::config::MontageConfig;
use crate::executor::Timeline;
use crate::project::Project;
use crate::tool::CommandExecutor;

use super::analysis::{AnalysisEngine, AudioAnalysis};
use super::error::{PlanError, PlanResult};
use super::models::{
    CaptionCue, CaptionStyle, EditPlan, EmotionLabel, MusicMood, Operation, PlanMode, TimeRange,
    TrimReason,
};

const FAST_PACE_KEEP_RATIO: f64 = 0.8;

/// Compiled keyword patterns for free-form editing prompts. The lexicon is
/// deliberately small, anything it does not recognize falls through to the
/// automatic heuristics.
pub struct PromptLexicon {
    keep_everything: Regex,
    cut_silence: Regex,
    cut_fillers: Regex,
    no_music: Regex,
    want_music: Regex,
    mood_upbeat: Regex,
    mood_calm: Regex,
    mood_emotional: Regex,
    mood_dramatic: Regex,
    no_captions: Regex,
    bold_captions: Regex,
    fast_paced: Regex,
    target_duration: Regex,
}

impl PromptLexicon {
    pub fn new() -> Self {
        Self {
            keep_everything: pattern(r"(?i)\b(keep everything|no cuts|don'?t (cut|trim))\b"),
            cut_silence: pattern(r"(?i)\b(silences?|dead air|pauses?|quiet parts?)\b"),
            cut_fillers: pattern(r"(?i)\b(fillers?|boring|dull|rambl\w*|slow parts?)\b"),
            no_music: pattern(r"(?i)\b(no|without|skip|remove)\b[^.,;]*\bmusic\b"),
            want_music: pattern(r"(?i)\b(add|with|background)\b[^.,;]*\bmusic\b"),
            mood_upbeat: pattern(r"(?i)\b(upbeat|energetic|happy|fun)\b"),
            mood_calm: pattern(r"(?i)\b(calm|chill|relax\w*|soft)\b"),
            mood_emotional: pattern(r"(?i)\b(emotional|sad|moving|heartfelt)\b"),
            mood_dramatic: pattern(r"(?i)\b(dramatic|intense|epic|cinematic)\b"),
            no_captions: pattern(r"(?i)\b(no|without|skip)\b[^.,;]*\b(captions?|subtitles?)\b"),
            bold_captions: pattern(
                r"(?i)\b(bold|big|loud|mr\.?\s?beast)\b[^.,;]*\b(captions?|subtitles?|text)\b",
            ),
            fast_paced: pattern(r"(?i)\b(fast[ -]paced|snappy|punchy|quick cuts|tight)\b"),
            target_duration: pattern(
                r"(?i)\b(?:under|within|max(?:imum)?)\s+(\d+)\s*(seconds?|secs?|minutes?|mins?|s|m)\b",
            ),
        }
    }

    pub fn parse(&self, prompt: &str) -> PromptDirectives {
        let mut directives = PromptDirectives::default();
        if self.keep_everything.is_match(prompt) {
            directives.keep_everything = true;
            directives.recognized = true;
        }
        if self.cut_silence.is_match(prompt) {
            directives.cut_silence = true;
            directives.recognized = true;
        }
        if self.cut_fillers.is_match(prompt) {
            directives.cut_fillers = true;
            directives.recognized = true;
        }
        if self.no_music.is_match(prompt) {
            directives.music = Some(false);
            directives.recognized = true;
        } else if self.want_music.is_match(prompt) {
            directives.music = Some(true);
            directives.recognized = true;
        }
        directives.music_mood = self.parse_mood(prompt);
        if directives.music_mood.is_some() {
            directives.recognized = true;
        }
        if self.no_captions.is_match(prompt) {
            directives.captions = Some(false);
            directives.recognized = true;
        } else if self.bold_captions.is_match(prompt) {
            directives.captions = Some(true);
            directives.caption_style = Some(CaptionStyle::Bold);
            directives.recognized = true;
        }
        if self.fast_paced.is_match(prompt) {
            directives.fast_paced = true;
            directives.recognized = true;
        }
        if let Some(target) = self.parse_target(prompt) {
            directives.target_duration = Some(target);
            directives.recognized = true;
        }
        directives
    }

    fn parse_mood(&self, prompt: &str) -> Option<MusicMood> {
        if self.mood_dramatic.is_match(prompt) {
            Some(MusicMood::Dramatic)
        } else if self.mood_emotional.is_match(prompt) {
            Some(MusicMood::Emotional)
        } else if self.mood_calm.is_match(prompt) {
            Some(MusicMood::Calm)
        } else if self.mood_upbeat.is_match(prompt) {
            Some(MusicMood::Upbeat)
        } else {
            None
        }
    }

    fn parse_target(&self, prompt: &str) -> Option<f64> {
        let captures = self.target_duration.captures(prompt)?;
        let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
        let unit = captures.get(2)?.as_str().to_ascii_lowercase();
        if unit.starts_with("min") || unit == "m" {
            Some(amount * 60.0)
        } else {
            Some(amount)
        }
    }
}

impl Default for PromptLexicon {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("valid regex")
}

/// What the prompt asked for. `recognized` distinguishes custom mode from
/// the automatic default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptDirectives {
    pub recognized: bool,
    pub keep_everything: bool,
    pub cut_silence: bool,
    pub cut_fillers: bool,
    pub music: Option<bool>,
    pub music_mood: Option<MusicMood>,
    pub captions: Option<bool>,
    pub caption_style: Option<CaptionStyle>,
    pub fast_paced: bool,
    pub target_duration: Option<f64>,
}

/// Turns a prompt plus audio analysis into an ordered edit plan. When the
/// audio cannot be analyzed at all, a minimal reframe-only plan keeps the
/// job moving instead of failing it.
pub struct PromptInterpreter {
    config: Arc<MontageConfig>,
    engine: AnalysisEngine,
    lexicon: PromptLexicon,
}

impl PromptInterpreter {
    pub fn new(config: Arc<MontageConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        let engine = AnalysisEngine::new(executor, config.analysis.clone());
        Self {
            config,
            engine,
            lexicon: PromptLexicon::new(),
        }
    }

    pub async fn interpret(&self, project: &Project, prompt: &str) -> PlanResult<EditPlan> {
        let directives = self.lexicon.parse(prompt);
        if directives.music == Some(false) && directives.music_mood.is_some() {
            return Err(PlanError::InvalidPrompt(
                "prompt both requests and disables music".to_string(),
            ));
        }
        let mode = if directives.recognized {
            PlanMode::Custom
        } else {
            PlanMode::Auto
        };

        let analysis = match self.engine.analyze(&project.source_path).await {
            Ok(analysis) => analysis,
            Err(PlanError::AnalysisUnavailable(reason)) => {
                warn!(
                    target: "montage::plan",
                    project_id = %project.project_id,
                    reason = %reason,
                    "audio analysis unavailable, emitting fallback plan"
                );
                return Ok(self.fallback_plan(project, mode));
            }
            Err(err) => return Err(err),
        };

        let plan = self.build_plan(project, mode, &directives, &analysis)?;
        info!(
            target: "montage::plan",
            project_id = %project.project_id,
            plan_id = %plan.plan_id,
            mode = %plan.mode,
            emotion = %plan.detected_emotion,
            operations = plan.operations_count(),
            "plan created"
        );
        Ok(plan)
    }

    /// Reframe-only plan used when no audio features are available.
    pub fn fallback_plan(&self, project: &Project, mode: PlanMode) -> EditPlan {
        let operations = self.reframe_operations(project);
        EditPlan::new(
            project.project_id.clone(),
            mode,
            EmotionLabel::Default,
            operations,
            project.duration_seconds,
        )
    }

    fn build_plan(
        &self,
        project: &Project,
        mode: PlanMode,
        directives: &PromptDirectives,
        analysis: &AudioAnalysis,
    ) -> PlanResult<EditPlan> {
        let mut timeline = Timeline::from_duration(analysis.duration);
        let mut operations = Vec::new();

        let trims_allowed = !directives.keep_everything;
        let auto = mode == PlanMode::Auto;

        // First trim runs in source coordinates, the timeline is untouched.
        if trims_allowed && (auto || directives.cut_silence) && !analysis.silence_ranges.is_empty()
        {
            let ranges = analysis.silence_ranges.clone();
            timeline
                .cut(&ranges)
                .map_err(|err| PlanError::Integrity(err.to_string()))?;
            operations.push(Operation::Trim {
                reason: TrimReason::Silence,
                ranges,
            });
        }

        if trims_allowed && (auto || directives.cut_fillers || directives.fast_paced) {
            let mapped = timeline.map_source_ranges(&analysis.dull_ranges);
            if !mapped.is_empty() {
                timeline
                    .cut(&mapped)
                    .map_err(|err| PlanError::Integrity(err.to_string()))?;
                operations.push(Operation::Trim {
                    reason: TrimReason::Filler,
                    ranges: mapped,
                });
            }
        }

        if trims_allowed {
            let target = directives.target_duration.or_else(|| {
                directives
                    .fast_paced
                    .then(|| timeline.duration() * FAST_PACE_KEEP_RATIO)
            });
            if let Some(target) = target {
                let ranges = self.pacing_cuts(&timeline, analysis, target);
                if !ranges.is_empty() {
                    timeline
                        .cut(&ranges)
                        .map_err(|err| PlanError::Integrity(err.to_string()))?;
                    operations.push(Operation::Trim {
                        reason: TrimReason::Emotion,
                        ranges,
                    });
                }
            }
        }

        if directives.captions.unwrap_or(true) {
            let cues = self.caption_cues(&timeline, analysis);
            if !cues.is_empty() {
                let style = directives
                    .caption_style
                    .unwrap_or_else(|| self.default_caption_style());
                operations.push(Operation::Caption {
                    style,
                    sync: true,
                    cues,
                });
            }
        }

        if directives.music.unwrap_or(true) {
            let mood = directives
                .music_mood
                .unwrap_or_else(|| MusicMood::for_emotion(analysis.emotion));
            let duck = timeline.map_source_ranges(&analysis.speech_ranges);
            operations.push(Operation::Music {
                mood,
                volume: self.config.music.default_volume,
                duck,
            });
        }

        operations.extend(self.reframe_operations(project));

        Ok(EditPlan::new(
            project.project_id.clone(),
            mode,
            analysis.emotion,
            operations,
            Some(analysis.duration),
        ))
    }

    /// Picks the least engaging surviving windows until the timeline would
    /// fit the target. Returned ranges are in current timeline coordinates.
    fn pacing_cuts(
        &self,
        timeline: &Timeline,
        analysis: &AudioAnalysis,
        target: f64,
    ) -> Vec<TimeRange> {
        let excess = timeline.duration() - target;
        if excess <= 0.0 {
            return Vec::new();
        }
        let window = analysis.window_seconds;
        let mut indexed: Vec<(usize, f64)> = analysis
            .engagement
            .iter()
            .copied()
            .enumerate()
            .collect();
        indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut chosen = Vec::new();
        let mut gathered = 0.0;
        for (index, _) in indexed {
            if gathered >= excess {
                break;
            }
            let start = index as f64 * window;
            let source = TimeRange::new(start, (start + window).min(analysis.duration));
            let mapped = timeline.map_source_ranges(&[source]);
            for range in mapped {
                gathered += range.duration();
                chosen.push(range);
            }
        }
        super::analysis::merge_ranges(chosen, 0.0, 0.0)
    }

    /// One timing-only cue per surviving speech stretch. Transcript text is
    /// out of scope for local analysis, renderers substitute a placeholder.
    fn caption_cues(&self, timeline: &Timeline, analysis: &AudioAnalysis) -> Vec<CaptionCue> {
        let min_cue = self.config.captions.min_cue_seconds;
        timeline
            .map_source_ranges(&analysis.speech_ranges)
            .into_iter()
            .filter(|range| range.duration() >= min_cue)
            .map(|range| CaptionCue {
                start: range.start,
                end: range.end,
                text: None,
            })
            .collect()
    }

    fn default_caption_style(&self) -> CaptionStyle {
        match self.config.captions.style.as_str() {
            "bold" => CaptionStyle::Bold,
            _ => CaptionStyle::Standard,
        }
    }

    fn reframe_operations(&self, project: &Project) -> Vec<Operation> {
        project
            .platforms
            .iter()
            .map(|platform| {
                let profile = platform.profile();
                Operation::Reframe {
                    platform: *platform,
                    aspect: profile.aspect,
                    max_duration_seconds: profile.max_duration_seconds,
                }
            })
            .collect()
    }
}
