use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::render::{AspectRatio, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Auto,
    Custom,
}

impl PlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanMode::Auto => "auto",
            PlanMode::Custom => "custom",
        }
    }
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(PlanMode::Auto),
            "custom" => Ok(PlanMode::Custom),
            other => Err(format!("unknown plan mode: {other}")),
        }
    }
}

/// Emotion label attached to a plan. `Default` is both the tie-break result
/// and the fallback when no audio could be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Excited,
    Happy,
    Calm,
    Sad,
    Angry,
    Neutral,
    Monotone,
    Silent,
    Default,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Excited => "excited",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Monotone => "monotone",
            EmotionLabel::Silent => "silent",
            EmotionLabel::Default => "default",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "excited" => Ok(EmotionLabel::Excited),
            "happy" => Ok(EmotionLabel::Happy),
            "calm" => Ok(EmotionLabel::Calm),
            "sad" => Ok(EmotionLabel::Sad),
            "angry" => Ok(EmotionLabel::Angry),
            "neutral" => Ok(EmotionLabel::Neutral),
            "monotone" => Ok(EmotionLabel::Monotone),
            "silent" => Ok(EmotionLabel::Silent),
            "default" => Ok(EmotionLabel::Default),
            other => Err(format!("unknown emotion label: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicMood {
    Upbeat,
    Calm,
    Emotional,
    Dramatic,
}

impl MusicMood {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicMood::Upbeat => "upbeat",
            MusicMood::Calm => "calm",
            MusicMood::Emotional => "emotional",
            MusicMood::Dramatic => "dramatic",
        }
    }

    pub fn for_emotion(emotion: EmotionLabel) -> Self {
        match emotion {
            EmotionLabel::Excited | EmotionLabel::Happy => MusicMood::Upbeat,
            EmotionLabel::Calm | EmotionLabel::Monotone | EmotionLabel::Silent => MusicMood::Calm,
            EmotionLabel::Sad => MusicMood::Emotional,
            EmotionLabel::Angry => MusicMood::Dramatic,
            EmotionLabel::Neutral | EmotionLabel::Default => MusicMood::Upbeat,
        }
    }
}

impl fmt::Display for MusicMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    Standard,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimReason {
    Silence,
    Filler,
    Emotion,
}

/// Half-open time range in seconds. Whether it addresses source or timeline
/// coordinates depends on where the operation sits in the plan: every range
/// is relative to the timeline state left by the preceding operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_well_formed(&self) -> bool {
        self.start >= 0.0 && self.end > self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub start: f64,
    pub end: f64,
    pub text: Option<String>,
}

/// Strict operation vocabulary. Analysis payloads are decoded into this
/// tagged set at the boundary; unknown kinds fail decoding instead of
/// propagating untyped data downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Trim {
        reason: TrimReason,
        ranges: Vec<TimeRange>,
    },
    Reorder {
        order: Vec<usize>,
    },
    Caption {
        style: CaptionStyle,
        sync: bool,
        cues: Vec<CaptionCue>,
    },
    Music {
        mood: MusicMood,
        volume: f32,
        duck: Vec<TimeRange>,
    },
    Reframe {
        platform: Platform,
        aspect: AspectRatio,
        max_duration_seconds: Option<f64>,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Trim { .. } => "trim",
            Operation::Reorder { .. } => "reorder",
            Operation::Caption { .. } => "caption",
            Operation::Music { .. } => "music",
            Operation::Reframe { .. } => "reframe",
        }
    }
}

/// Ordered, immutable edit plan. Re-running analysis creates a new plan with
/// a fresh identifier, never mutates an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    pub plan_id: String,
    pub project_id: String,
    pub mode: PlanMode,
    pub detected_emotion: EmotionLabel,
    pub operations: Vec<Operation>,
    pub source_duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl EditPlan {
    pub fn new(
        project_id: impl Into<String>,
        mode: PlanMode,
        detected_emotion: EmotionLabel,
        operations: Vec<Operation>,
        source_duration: Option<f64>,
    ) -> Self {
        Self {
            plan_id: format!("plan-{}", Uuid::new_v4().simple()),
            project_id: project_id.into(),
            mode,
            detected_emotion,
            operations,
            source_duration,
            created_at: Utc::now(),
        }
    }

    pub fn operations_count(&self) -> usize {
        self.operations.len()
    }

    pub fn trim_operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Trim { .. }))
    }

    pub fn encode_operations(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.operations)
    }

    pub fn decode_operations(payload: &str) -> serde_json::Result<Vec<Operation>> {
        serde_json::from_str(payload)
    }
}
