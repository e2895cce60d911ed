//! Campaign Media Pipeline
//!
//! Sequential voiceover, video ad, cinematic, and avatar generation for one
//! campaign, with per-stage progress and asset registration.

pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod registry;

pub use models::{
    AggregateStatus, AssetRef, AvailableAssets, CampaignBrief, EnabledSteps, GeneratedAsset,
    MediaKind, MediaPayload, PipelineErrorEntry, PipelineResult, PipelineStep, ProducedMedia,
    StepErrorKind, StepOutcome, StepReport,
};
pub use orchestrator::{OrchestratorConfig, PipelineOrchestrator, StepProviders, StepTimeouts};
pub use progress::{CampaignProgress, InMemoryProgressStore, ProgressSink, ProgressUpdate, StageStatus};
pub use registry::{AssetRegistry, InMemoryAssetRegistry, RegisteredAsset};
