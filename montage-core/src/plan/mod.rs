mod analysis;
mod error;
mod interpreter;
mod models;

pub use analysis::{
    complement_ranges, merge_ranges, AnalysisEngine, AudioAnalysis, FrameFeatures,
};
pub use error::{PlanError, PlanResult};
pub use interpreter::{PromptDirectives, PromptInterpreter, PromptLexicon};
pub use models::{
    CaptionCue, CaptionStyle, EditPlan, EmotionLabel, MusicMood, Operation, PlanMode, TimeRange,
    TrimReason,
};
