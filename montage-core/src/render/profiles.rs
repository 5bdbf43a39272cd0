use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

/// Delivery target for a rendered variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    pub fn profile(&self) -> PlatformProfile {
        match self {
            Platform::Youtube => PlatformProfile {
                platform: *self,
                aspect: AspectRatio::Wide16x9,
                width: 1920,
                height: 1080,
                max_duration_seconds: None,
                label: "youtube_16x9",
            },
            Platform::Instagram => PlatformProfile {
                platform: *self,
                aspect: AspectRatio::Tall9x16,
                width: 1080,
                height: 1920,
                max_duration_seconds: Some(90.0),
                label: "instagram_9x16",
            },
            Platform::Tiktok => PlatformProfile {
                platform: *self,
                aspect: AspectRatio::Tall9x16,
                width: 1080,
                height: 1920,
                max_duration_seconds: Some(60.0),
                label: "tiktok_9x16",
            },
        }
    }

    /// Parses the comma-separated platform form used by uploads
    /// (`"youtube, instagram"`). Order is preserved, duplicates dropped.
    pub fn parse_list(input: &str) -> Result<Vec<Platform>, UnknownPlatform> {
        let mut platforms = Vec::new();
        for token in input.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let platform = token.parse::<Platform>()?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Ok(platforms)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    Wide16x9,
    Tall9x16,
}

impl AspectRatio {
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Wide16x9 => "16x9",
            AspectRatio::Tall9x16 => "9x16",
        }
    }
}

/// Encode target for one platform. Vertical targets center-crop the source
/// before scaling.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub aspect: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub max_duration_seconds: Option<f64>,
    pub label: &'static str,
}

impl PlatformProfile {
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.label)
    }

    pub fn capped_duration(&self, duration: f64) -> f64 {
        match self.max_duration_seconds {
            Some(cap) if duration > cap => cap,
            _ => duration,
        }
    }
}
