//! Generative Media Module
//!
//! Provider abstraction plus the request/result types for the three kinds of
//! media the pipeline produces: narration audio, image-to-video clips, and
//! talking-presenter video.

pub mod audio;
pub mod polling;
#[cfg(feature = "ai-providers")]
pub mod provider_impls;
pub mod providers;
pub mod video;

pub use audio::{AudioFormat, TTSParams, TTSResult, MAX_NARRATION_CHARS};
pub use polling::{wait_for_video, PollPolicy};
pub use providers::{
    GenerativeProvider, MockBehavior, MockGenerativeProvider, ProviderCapability,
};
pub use video::{
    AvatarVideoParams, VideoGenerationParams, VideoGenerationResult, VideoGenerationStatus,
    VideoJobHandle, VideoKind, MAX_PROMPT_CHARS, VALID_ASPECT_RATIOS,
};
