//! Video Generation Types
//!
//! Data models for image-to-video ad clips, cinematic hero videos, and
//! talking-presenter avatar videos. All video providers use an async
//! submit + poll pattern.

use serde::{Deserialize, Serialize};

/// Maximum prompt length accepted by video providers
pub const MAX_PROMPT_CHARS: usize = 1_000;

/// Aspect ratios accepted by the video steps
pub const VALID_ASPECT_RATIOS: [&str; 3] = ["16:9", "9:16", "1:1"];

// =============================================================================
// Enums
// =============================================================================

/// Kind of video being generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    /// Short platform-specific ad clip
    Ad,
    /// Single hero/cinematic clip
    Cinematic,
    /// Talking presenter
    Avatar,
}

impl std::fmt::Display for VideoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoKind::Ad => write!(f, "Video Ad"),
            VideoKind::Cinematic => write!(f, "Cinematic Video"),
            VideoKind::Avatar => write!(f, "Avatar Video"),
        }
    }
}

// =============================================================================
// Generation Parameters
// =============================================================================

/// Parameters for image-to-video generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationParams {
    /// Text prompt describing motion and mood
    pub prompt: String,
    /// Source image URL the clip animates
    pub source_image_url: String,
    /// What the clip is for
    pub kind: VideoKind,
    /// Aspect ratio (e.g., "16:9", "9:16", "1:1")
    pub aspect_ratio: String,
    /// Desired duration in seconds
    pub duration_sec: u32,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl VideoGenerationParams {
    /// Create new image-to-video params with defaults
    pub fn new(prompt: impl Into<String>, source_image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            source_image_url: source_image_url.into(),
            kind: VideoKind::Ad,
            aspect_ratio: "16:9".to_string(),
            duration_sec: 5,
            seed: None,
        }
    }

    /// Set video kind
    pub fn with_kind(mut self, kind: VideoKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set aspect ratio
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = ratio.into();
        self
    }

    /// Set duration in seconds
    pub fn with_duration(mut self, duration_sec: u32) -> Self {
        self.duration_sec = duration_sec.clamp(5, 10);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<(), String> {
        validate_prompt(&self.prompt)?;

        if self.source_image_url.trim().is_empty() {
            return Err("Image-to-video requires a source image".to_string());
        }

        if !VALID_ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            return Err(format!(
                "Invalid aspect ratio '{}'. Valid: {}",
                self.aspect_ratio,
                VALID_ASPECT_RATIOS.join(", ")
            ));
        }

        if !(5..=10).contains(&self.duration_sec) {
            return Err(format!(
                "Invalid duration: {}s (5-10s supported)",
                self.duration_sec
            ));
        }

        Ok(())
    }
}

/// Parameters for a talking-presenter video
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarVideoParams {
    /// Narration the presenter speaks
    pub script: String,
    /// Presenter face image URL
    pub presenter_image_url: String,
    /// Pre-rendered narration audio; when set, the provider lip-syncs to it
    pub audio_url: Option<String>,
    /// Provider voice for text scripts
    pub voice_id: Option<String>,
}

impl AvatarVideoParams {
    pub fn new(script: impl Into<String>, presenter_image_url: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            presenter_image_url: presenter_image_url.into(),
            audio_url: None,
            voice_id: None,
        }
    }

    /// Use pre-rendered narration audio
    pub fn with_audio(mut self, audio_url: impl Into<String>) -> Self {
        self.audio_url = Some(audio_url.into());
        self
    }

    /// Set the text-to-speech voice
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.presenter_image_url.trim().is_empty() {
            return Err("Avatar video requires a presenter image".to_string());
        }
        if self.audio_url.is_none() && self.script.trim().is_empty() {
            return Err("Avatar video requires a script or narration audio".to_string());
        }
        Ok(())
    }
}

fn validate_prompt(prompt: &str) -> Result<(), String> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err("Prompt cannot be empty".to_string());
    }
    let chars = trimmed.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(format!(
            "Prompt too long: {} characters (max {})",
            chars, MAX_PROMPT_CHARS
        ));
    }
    Ok(())
}

// =============================================================================
// Job Handle & Status
// =============================================================================

/// Handle for tracking a submitted video generation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJobHandle {
    /// Provider identifier (e.g., "runway")
    pub provider: String,
    /// Provider-assigned job ID
    pub job_id: String,
    /// Unix timestamp when submitted
    pub submitted_at: i64,
}

/// Status of a video generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoGenerationStatus {
    /// Job is queued but not yet started
    Queued,
    /// Job is actively being processed
    Processing {
        progress: Option<f64>,
        message: Option<String>,
    },
    /// Job completed successfully
    Completed {
        download_url: String,
        duration_sec: Option<f64>,
    },
    /// Job failed
    Failed { error: String, code: Option<String> },
    /// Job was cancelled
    Cancelled,
}

impl VideoGenerationStatus {
    /// Whether the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoGenerationStatus::Completed { .. }
                | VideoGenerationStatus::Failed { .. }
                | VideoGenerationStatus::Cancelled
        )
    }
}

// =============================================================================
// Generation Result
// =============================================================================

/// Result of a completed video generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationResult {
    /// Provider job that produced the video
    pub job: VideoJobHandle,
    /// Where the rendered video can be fetched
    pub download_url: String,
    /// Duration reported by the provider
    pub duration_sec: Option<f64>,
    /// Polls it took to reach the terminal state
    pub polls: u32,
    /// Wall-clock generation time in milliseconds
    pub generation_time_ms: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_params_defaults_validate() {
        let params = VideoGenerationParams::new("湯気の立つ抹茶ラテ", "https://cdn/img.png");
        assert_eq!(params.kind, VideoKind::Ad);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_video_params_rejects_bad_input() {
        let empty_prompt = VideoGenerationParams::new("  ", "https://cdn/img.png");
        assert!(empty_prompt.validate().is_err());

        let no_image = VideoGenerationParams::new("prompt", "");
        assert!(no_image.validate().unwrap_err().contains("source image"));

        let bad_ratio =
            VideoGenerationParams::new("prompt", "https://cdn/img.png").with_aspect_ratio("4:3");
        assert!(bad_ratio.validate().unwrap_err().contains("aspect ratio"));

        let long = VideoGenerationParams::new("あ".repeat(MAX_PROMPT_CHARS + 1), "u");
        assert!(long.validate().unwrap_err().contains("too long"));
    }

    #[test]
    fn test_duration_clamped() {
        let params = VideoGenerationParams::new("p", "u").with_duration(30);
        assert_eq!(params.duration_sec, 10);
    }

    #[test]
    fn test_avatar_params_validation() {
        assert!(AvatarVideoParams::new("こんにちは", "https://cdn/face.png")
            .validate()
            .is_ok());
        assert!(AvatarVideoParams::new("こんにちは", " ").validate().is_err());
        assert!(AvatarVideoParams::new("", "https://cdn/face.png")
            .validate()
            .is_err());
        assert!(AvatarVideoParams::new("", "https://cdn/face.png")
            .with_audio("https://cdn/vo.mp3")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!VideoGenerationStatus::Queued.is_terminal());
        assert!(!VideoGenerationStatus::Processing {
            progress: Some(0.4),
            message: None
        }
        .is_terminal());
        assert!(VideoGenerationStatus::Cancelled.is_terminal());
        assert!(VideoGenerationStatus::Failed {
            error: "x".into(),
            code: None
        }
        .is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let status = VideoGenerationStatus::Completed {
            download_url: "https://cdn/out.mp4".into(),
            duration_sec: Some(5.0),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["download_url"], "https://cdn/out.mp4");
    }
}
