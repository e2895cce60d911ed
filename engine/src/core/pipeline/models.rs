//! Pipeline Models
//!
//! Inputs, per-step outcomes, and the aggregate result of a campaign
//! pipeline run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::generative::audio::MAX_NARRATION_CHARS;
use crate::core::generative::video::MAX_PROMPT_CHARS;
use crate::core::generative::ProviderCapability;
use crate::core::{AssetId, CampaignId, CoreError, CoreResult, JobId, Platform, ProviderId};

// =============================================================================
// Steps
// =============================================================================

/// One stage of the campaign media pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Voiceover,
    VideoAd,
    CinematicVideo,
    AvatarVideo,
}

impl PipelineStep {
    /// Execution order: cheapest and fastest providers first
    pub const ORDER: [PipelineStep; 4] = [
        PipelineStep::Voiceover,
        PipelineStep::VideoAd,
        PipelineStep::CinematicVideo,
        PipelineStep::AvatarVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Voiceover => "voiceover",
            PipelineStep::VideoAd => "video_ad",
            PipelineStep::CinematicVideo => "cinematic_video",
            PipelineStep::AvatarVideo => "avatar_video",
        }
    }

    /// Kind of media the step produces
    pub fn output_kind(&self) -> MediaKind {
        match self {
            PipelineStep::Voiceover => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    /// Capability the step's provider must offer
    pub fn capability(&self) -> ProviderCapability {
        match self {
            PipelineStep::Voiceover => ProviderCapability::TextToSpeech,
            PipelineStep::VideoAd | PipelineStep::CinematicVideo => {
                ProviderCapability::ImageToVideo
            }
            PipelineStep::AvatarVideo => ProviderCapability::AvatarVideo,
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "voiceover" => Ok(PipelineStep::Voiceover),
            "video_ad" | "video" => Ok(PipelineStep::VideoAd),
            "cinematic_video" | "cinematic" => Ok(PipelineStep::CinematicVideo),
            "avatar_video" | "avatar" => Ok(PipelineStep::AvatarVideo),
            other => Err(format!("Unknown pipeline step: {}", other)),
        }
    }
}

/// Media kind of a produced asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

// =============================================================================
// Inputs
// =============================================================================

/// Creative direction for one campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBrief {
    pub product_name: String,
    /// Narration script spoken by the voiceover and the presenter
    #[serde(default)]
    pub narration: String,
    /// Motion prompt for the platform video ads
    #[serde(default)]
    pub video_prompt: String,
    /// Prompt for the cinematic video; falls back to `video_prompt`
    #[serde(default)]
    pub cinematic_prompt: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Voiceover voice; the provider default applies when unset
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Platforms that each get a video ad
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

fn default_language() -> String {
    "ja".to_string()
}

impl CampaignBrief {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            narration: String::new(),
            video_prompt: String::new(),
            cinematic_prompt: None,
            language: default_language(),
            voice_id: None,
            platforms: Vec::new(),
        }
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = narration.into();
        self
    }

    pub fn with_video_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.video_prompt = prompt.into();
        self
    }

    pub fn with_cinematic_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.cinematic_prompt = Some(prompt.into());
        self
    }

    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    /// Prompt used by the cinematic step
    pub fn effective_cinematic_prompt(&self) -> &str {
        self.cinematic_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.video_prompt)
    }

    /// Platforms in request order, without duplicates
    pub fn unique_platforms(&self) -> Vec<Platform> {
        let mut seen = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            if !seen.contains(platform) {
                seen.push(*platform);
            }
        }
        seen
    }

    /// Checks that every enabled step has the brief fields it consumes
    pub fn validate(&self, enabled: &EnabledSteps) -> CoreResult<()> {
        if self.product_name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Brief must name the product".to_string(),
            ));
        }

        if enabled.include_voiceover || enabled.include_avatar {
            let narration = self.narration.trim();
            if narration.is_empty() {
                return Err(CoreError::ValidationError(
                    "Voiceover and avatar steps require a narration script".to_string(),
                ));
            }
            let chars = narration.chars().count();
            if chars > MAX_NARRATION_CHARS {
                return Err(CoreError::ValidationError(format!(
                    "Narration too long: {} characters (max {})",
                    chars, MAX_NARRATION_CHARS
                )));
            }
        }

        if enabled.include_video && self.platforms.is_empty() {
            return Err(CoreError::ValidationError(
                "Video ads are enabled but no platforms were requested".to_string(),
            ));
        }

        if enabled.include_video || enabled.include_cinematic {
            let prompt = if enabled.include_video {
                self.video_prompt.as_str()
            } else {
                self.effective_cinematic_prompt()
            };
            if prompt.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "Video steps require a video prompt".to_string(),
                ));
            }
            for p in [self.video_prompt.as_str(), self.effective_cinematic_prompt()] {
                if p.trim().chars().count() > MAX_PROMPT_CHARS {
                    return Err(CoreError::ValidationError(format!(
                        "Video prompt too long (max {} characters)",
                        MAX_PROMPT_CHARS
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Reference to a stored asset (input image or produced media)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: AssetId,
    pub url: String,
}

impl AssetRef {
    pub fn new(id: impl Into<AssetId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Images already produced for the campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAssets {
    /// Key visual; source for the cinematic video and fallback for ads
    #[serde(default)]
    pub hero_image: Option<AssetRef>,
    /// Platform-specific ad creatives
    #[serde(default)]
    pub platform_images: HashMap<Platform, AssetRef>,
    /// Presenter face for the avatar video
    #[serde(default)]
    pub presenter_image: Option<AssetRef>,
}

impl AvailableAssets {
    pub fn with_hero(mut self, asset: AssetRef) -> Self {
        self.hero_image = Some(asset);
        self
    }

    pub fn with_platform_image(mut self, platform: Platform, asset: AssetRef) -> Self {
        self.platform_images.insert(platform, asset);
        self
    }

    pub fn with_presenter(mut self, asset: AssetRef) -> Self {
        self.presenter_image = Some(asset);
        self
    }

    /// Source image for a platform ad (platform creative, else hero)
    pub fn image_for(&self, platform: Platform) -> Option<&AssetRef> {
        self.platform_images
            .get(&platform)
            .or(self.hero_image.as_ref())
    }
}

/// Which steps the campaign configuration enables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledSteps {
    #[serde(default = "enabled")]
    pub include_voiceover: bool,
    #[serde(default = "enabled")]
    pub include_video: bool,
    #[serde(default = "enabled")]
    pub include_cinematic: bool,
    #[serde(default = "enabled")]
    pub include_avatar: bool,
}

fn enabled() -> bool {
    true
}

impl Default for EnabledSteps {
    fn default() -> Self {
        Self::all()
    }
}

impl EnabledSteps {
    pub fn all() -> Self {
        Self {
            include_voiceover: true,
            include_video: true,
            include_cinematic: true,
            include_avatar: true,
        }
    }

    pub fn none() -> Self {
        Self {
            include_voiceover: false,
            include_video: false,
            include_cinematic: false,
            include_avatar: false,
        }
    }

    /// Returns a copy with one step toggled
    pub fn with(mut self, step: PipelineStep, on: bool) -> Self {
        match step {
            PipelineStep::Voiceover => self.include_voiceover = on,
            PipelineStep::VideoAd => self.include_video = on,
            PipelineStep::CinematicVideo => self.include_cinematic = on,
            PipelineStep::AvatarVideo => self.include_avatar = on,
        }
        self
    }

    pub fn is_enabled(&self, step: PipelineStep) -> bool {
        match step {
            PipelineStep::Voiceover => self.include_voiceover,
            PipelineStep::VideoAd => self.include_video,
            PipelineStep::CinematicVideo => self.include_cinematic,
            PipelineStep::AvatarVideo => self.include_avatar,
        }
    }

    pub fn any(&self) -> bool {
        PipelineStep::ORDER.iter().any(|s| self.is_enabled(*s))
    }
}

// =============================================================================
// Produced Media
// =============================================================================

/// Where produced media lives before registration
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPayload {
    /// Encoded bytes returned inline (speech)
    Bytes(Vec<u8>),
    /// Provider-hosted file (video jobs)
    Url(String),
}

/// Media a provider produced, handed to the asset registry
#[derive(Debug, Clone)]
pub struct ProducedMedia {
    pub step: PipelineStep,
    pub platform: Option<Platform>,
    pub kind: MediaKind,
    pub payload: MediaPayload,
    pub mime_type: String,
    pub duration_sec: Option<f64>,
    pub provider: ProviderId,
    pub provider_job_id: Option<JobId>,
}

/// An asset registered during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAsset {
    pub asset: AssetRef,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    pub provider: ProviderId,
}

// =============================================================================
// Outcomes & Result
// =============================================================================

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Every provider call succeeded and its asset was registered
    Completed,
    /// A required input asset was absent; no provider call was made
    DependencyMissing,
    /// The provider's circuit was open; no provider call was made
    CircuitOpen,
    /// A provider call failed, timed out, was cancelled, or its asset was rejected
    Failed,
}

/// Reason code of an error entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    DependencyMissing,
    CircuitOpen,
    ProviderFailure,
    Timeout,
    Cancelled,
    Registration,
}

impl StepErrorKind {
    /// Whether a failed provider call of this kind counts against its circuit.
    ///
    /// `Cancelled` is only produced for a call that was already in flight;
    /// steps cancelled before they start never reach the provider.
    pub fn counts_against_circuit(&self) -> bool {
        matches!(
            self,
            StepErrorKind::ProviderFailure | StepErrorKind::Timeout | StepErrorKind::Cancelled
        )
    }
}

/// Outcome of one enabled step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step: PipelineStep,
    pub outcome: StepOutcome,
    pub provider: ProviderId,
    /// Assets produced by this step; may be non-empty for a failed multi-call step
    pub assets: Vec<GeneratedAsset>,
    pub duration_ms: u64,
}

/// One entry in the run's ordered error list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineErrorEntry {
    pub stage: PipelineStep,
    pub kind: StepErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Aggregate status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    /// Every enabled step completed
    Complete,
    /// Some steps completed, some did not
    Partial,
    /// No enabled step completed
    Failed,
}

impl AggregateStatus {
    pub fn from_reports(reports: &[StepReport]) -> Self {
        let completed = reports
            .iter()
            .filter(|r| r.outcome == StepOutcome::Completed)
            .count();
        if completed == 0 {
            AggregateStatus::Failed
        } else if completed == reports.len() {
            AggregateStatus::Complete
        } else {
            AggregateStatus::Partial
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub campaign_id: CampaignId,
    pub status: AggregateStatus,
    /// One report per enabled step, in execution order
    pub steps: Vec<StepReport>,
    /// Every error entry, in the order it was recorded
    pub errors: Vec<PipelineErrorEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn step(&self, step: PipelineStep) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn errors_for(&self, step: PipelineStep) -> impl Iterator<Item = &PipelineErrorEntry> {
        self.errors.iter().filter(move |e| e.stage == step)
    }

    /// All assets registered during the run
    pub fn assets(&self) -> impl Iterator<Item = &GeneratedAsset> {
        self.steps.iter().flat_map(|r| r.assets.iter())
    }
}

// =============================================================================
// Tests
// =============================================================================
