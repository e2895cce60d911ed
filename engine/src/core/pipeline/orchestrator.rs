//! Pipeline Orchestrator
//!
//! Runs the campaign media steps in a fixed order:
//!
//! 1. Voiceover (narration text to audio)
//! 2. Video ads (one image-to-video call per requested platform)
//! 3. Cinematic video (hero image to video)
//! 4. Avatar video (talking presenter)
//!
//! Each step checks its input dependency, then the provider's circuit, then
//! calls the provider under a wall-clock timeout. A step failure is recorded
//! in the result and never stops later steps.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::{
    AggregateStatus, AvailableAssets, CampaignBrief, EnabledSteps, GeneratedAsset, MediaPayload,
    PipelineErrorEntry, PipelineResult, PipelineStep, ProducedMedia, StepErrorKind, StepOutcome,
    StepReport,
};
use super::progress::{ProgressSink, ProgressUpdate, StageStatus};
use super::registry::AssetRegistry;
use crate::core::generative::{
    wait_for_video, AvatarVideoParams, GenerativeProvider, MockGenerativeProvider, PollPolicy,
    TTSParams, VideoGenerationParams, VideoJobHandle, VideoKind,
};
use crate::core::health::CircuitGate;
use crate::core::settings::PipelineSettings;
use crate::core::{CoreError, CoreResult, JobId, Platform};

/// Aspect ratio of the cinematic video
const CINEMATIC_ASPECT_RATIO: &str = "16:9";

/// Cinematic clips use the longest duration providers offer
const CINEMATIC_DURATION_SEC: u32 = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Wall-clock limit for one provider call, per step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub voiceover: Duration,
    /// Applies to each platform call separately
    pub video_ad: Duration,
    pub cinematic_video: Duration,
    pub avatar_video: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            voiceover: Duration::from_secs(60),
            video_ad: Duration::from_secs(600),
            cinematic_video: Duration::from_secs(600),
            avatar_video: Duration::from_secs(900),
        }
    }
}

impl StepTimeouts {
    pub fn for_step(&self, step: PipelineStep) -> Duration {
        match step {
            PipelineStep::Voiceover => self.voiceover,
            PipelineStep::VideoAd => self.video_ad,
            PipelineStep::CinematicVideo => self.cinematic_video,
            PipelineStep::AvatarVideo => self.avatar_video,
        }
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub timeouts: StepTimeouts,
    pub poll: PollPolicy,
    /// Presenter image used when the campaign has none
    pub default_presenter_url: Option<String>,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            timeouts: settings.step_timeouts(),
            poll: settings.poll_policy(),
            default_presenter_url: settings.providers.did.default_presenter_url.clone(),
        }
    }
}

/// The provider behind each step
#[derive(Clone)]
pub struct StepProviders {
    pub voiceover: Arc<dyn GenerativeProvider>,
    pub video_ad: Arc<dyn GenerativeProvider>,
    pub cinematic: Arc<dyn GenerativeProvider>,
    pub avatar: Arc<dyn GenerativeProvider>,
}

impl std::fmt::Debug for StepProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepProviders")
            .field("voiceover", &self.voiceover.name())
            .field("video_ad", &self.video_ad.name())
            .field("cinematic", &self.cinematic.name())
            .field("avatar", &self.avatar.name())
            .finish()
    }
}

impl StepProviders {
    pub fn for_step(&self, step: PipelineStep) -> &Arc<dyn GenerativeProvider> {
        match step {
            PipelineStep::Voiceover => &self.voiceover,
            PipelineStep::VideoAd => &self.video_ad,
            PipelineStep::CinematicVideo => &self.cinematic,
            PipelineStep::AvatarVideo => &self.avatar,
        }
    }

    /// Replaces the provider behind one step
    ///
    /// Fails when the provider lacks the capability the step needs.
    pub fn with_provider(
        mut self,
        step: PipelineStep,
        provider: Arc<dyn GenerativeProvider>,
    ) -> CoreResult<Self> {
        Self::check_capability(step, provider.as_ref())?;
        match step {
            PipelineStep::Voiceover => self.voiceover = provider,
            PipelineStep::VideoAd => self.video_ad = provider,
            PipelineStep::CinematicVideo => self.cinematic = provider,
            PipelineStep::AvatarVideo => self.avatar = provider,
        }
        Ok(self)
    }

    /// Checks that every step's provider offers the capability it needs
    pub fn validate(&self) -> CoreResult<()> {
        PipelineStep::ORDER
            .iter()
            .try_for_each(|step| Self::check_capability(*step, self.for_step(*step).as_ref()))
    }

    fn check_capability(step: PipelineStep, provider: &dyn GenerativeProvider) -> CoreResult<()> {
        let capability = step.capability();
        if provider.supports(capability) {
            Ok(())
        } else {
            Err(CoreError::NotSupported(format!(
                "Provider {} cannot serve the {} step ({})",
                provider.name(),
                step,
                capability
            )))
        }
    }

    /// Mock providers under the production circuit keys, for dry runs
    pub fn simulated(latency: Duration) -> Self {
        let mock = |name: &str| -> Arc<dyn GenerativeProvider> {
            Arc::new(MockGenerativeProvider::new(name).with_latency(latency))
        };
        Self {
            voiceover: mock("elevenlabs"),
            video_ad: mock("runway"),
            cinematic: mock("runway-cinematic"),
            avatar: mock("d-id"),
        }
    }

    /// HTTP providers built from persisted settings
    #[cfg(feature = "ai-providers")]
    pub fn from_settings(settings: &crate::core::settings::ProviderSettings) -> CoreResult<Self> {
        use crate::core::generative::provider_impls::{
            DidAvatarProvider, ElevenLabsProvider, RunwayProvider,
        };

        let providers = Self {
            voiceover: Arc::new(ElevenLabsProvider::from_settings(&settings.elevenlabs)?),
            video_ad: Arc::new(RunwayProvider::from_settings(&settings.runway)?),
            cinematic: Arc::new(RunwayProvider::from_settings(&settings.runway_cinematic)?),
            avatar: Arc::new(DidAvatarProvider::from_settings(&settings.did)?),
        };
        providers.validate()?;
        Ok(providers)
    }
}

/// Whether a remote provider can download from `url`
fn is_fetchable_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

// =============================================================================
// Per-call plumbing
// =============================================================================

/// Typed input for one provider call
enum CallRequest {
    Speech(TTSParams),
    Video(VideoGenerationParams),
    Avatar(AvatarVideoParams),
}

/// What a successful provider call produced
struct CallOutput {
    payload: MediaPayload,
    mime_type: String,
    duration_sec: Option<f64>,
    job_id: Option<JobId>,
}

/// A failed provider call
struct CallFailure {
    kind: StepErrorKind,
    message: String,
}

impl From<CoreError> for CallFailure {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Timeout(_) => StepErrorKind::Timeout,
            CoreError::Cancelled(_) => StepErrorKind::Cancelled,
            _ => StepErrorKind::ProviderFailure,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Mutable state of one run
struct RunState<'a> {
    campaign_id: &'a str,
    cancel: &'a CancellationToken,
    errors: Vec<PipelineErrorEntry>,
    /// Location of this run's voiceover, handed to the avatar step
    voiceover_url: Option<String>,
}

impl RunState<'_> {
    fn push_error(
        &mut self,
        stage: PipelineStep,
        kind: StepErrorKind,
        platform: Option<Platform>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(
            campaign_id = %self.campaign_id,
            stage = %stage,
            ?kind,
            platform = platform.map(|p| p.as_str()),
            "Pipeline step error: {}",
            message
        );
        self.errors.push(PipelineErrorEntry {
            stage,
            kind,
            platform,
            message,
            at: Utc::now(),
        });
    }
}

/// How one gated call ended
enum CallResult {
    Produced(GeneratedAsset),
    Skipped(StepOutcome),
    Failed,
}

// =============================================================================
// PipelineOrchestrator
// =============================================================================

/// Sequences the campaign media steps against their providers
pub struct PipelineOrchestrator {
    gate: Arc<dyn CircuitGate>,
    providers: StepProviders,
    sink: Arc<dyn ProgressSink>,
    registry: Arc<dyn AssetRegistry>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        gate: Arc<dyn CircuitGate>,
        providers: StepProviders,
        sink: Arc<dyn ProgressSink>,
        registry: Arc<dyn AssetRegistry>,
    ) -> Self {
        Self {
            gate,
            providers,
            sink,
            registry,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs every enabled step for one campaign.
    ///
    /// Fails only for invalid input, before any step runs. Step failures are
    /// reported in the returned [`PipelineResult`].
    pub async fn run(
        &self,
        campaign_id: &str,
        brief: &CampaignBrief,
        assets: &AvailableAssets,
        enabled: EnabledSteps,
    ) -> CoreResult<PipelineResult> {
        self.run_with_cancellation(
            campaign_id,
            brief,
            assets,
            enabled,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires.
    ///
    /// The step in flight when the token fires is recorded as a failure;
    /// steps that had not started are recorded as cancelled without calling
    /// their provider.
    pub async fn run_with_cancellation(
        &self,
        campaign_id: &str,
        brief: &CampaignBrief,
        assets: &AvailableAssets,
        enabled: EnabledSteps,
        cancel: &CancellationToken,
    ) -> CoreResult<PipelineResult> {
        if campaign_id.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Campaign id cannot be empty".to_string(),
            ));
        }
        if !enabled.any() {
            return Err(CoreError::NoStepsEnabled(campaign_id.to_string()));
        }
        brief.validate(&enabled)?;

        let started_at = Utc::now();
        info!(
            campaign_id = %campaign_id,
            ?enabled,
            "Starting campaign pipeline"
        );

        for step in PipelineStep::ORDER {
            let status = if enabled.is_enabled(step) {
                StageStatus::Pending
            } else {
                StageStatus::Skipped
            };
            self.publish(ProgressUpdate::new(campaign_id, step, status))
                .await;
        }

        let mut state = RunState {
            campaign_id,
            cancel,
            errors: Vec::new(),
            voiceover_url: None,
        };
        let mut steps = Vec::new();

        for step in PipelineStep::ORDER {
            if !enabled.is_enabled(step) {
                continue;
            }
            let report = self.run_step(step, brief, assets, &mut state).await;
            steps.push(report);
        }

        let status = AggregateStatus::from_reports(&steps);
        info!(
            campaign_id = %campaign_id,
            ?status,
            errors = state.errors.len(),
            "Campaign pipeline finished"
        );

        Ok(PipelineResult {
            campaign_id: campaign_id.to_string(),
            status,
            steps,
            errors: state.errors,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_step(
        &self,
        step: PipelineStep,
        brief: &CampaignBrief,
        assets: &AvailableAssets,
        state: &mut RunState<'_>,
    ) -> StepReport {
        let started = Instant::now();
        let provider = Arc::clone(self.providers.for_step(step));

        let (outcome, produced) = if state.cancel.is_cancelled() {
            state.push_error(
                step,
                StepErrorKind::Cancelled,
                None,
                "Run cancelled before the step started",
            );
            (StepOutcome::Failed, Vec::new())
        } else {
            self.publish(ProgressUpdate::new(
                state.campaign_id,
                step,
                StageStatus::Generating,
            ))
            .await;

            match step {
                PipelineStep::VideoAd => {
                    self.run_video_ads(provider.as_ref(), brief, assets, state)
                        .await
                }
                _ => {
                    let result = match self.single_call_request(step, brief, assets, state) {
                        Some(request) => {
                            self.gated_call(step, None, provider.as_ref(), request, state)
                                .await
                        }
                        None => {
                            state.push_error(
                                step,
                                StepErrorKind::DependencyMissing,
                                None,
                                Self::missing_dependency_message(step),
                            );
                            CallResult::Skipped(StepOutcome::DependencyMissing)
                        }
                    };
                    match result {
                        CallResult::Produced(asset) => (StepOutcome::Completed, vec![asset]),
                        CallResult::Skipped(outcome) => (outcome, Vec::new()),
                        CallResult::Failed => (StepOutcome::Failed, Vec::new()),
                    }
                }
            }
        };

        if step == PipelineStep::Voiceover {
            state.voiceover_url = produced.first().map(|a| a.asset.url.clone());
        }

        let mut update = ProgressUpdate::new(
            state.campaign_id,
            step,
            if outcome == StepOutcome::Completed {
                StageStatus::Complete
            } else {
                StageStatus::Failed
            },
        );
        if let Some(last) = state.errors.iter().rev().find(|e| e.stage == step) {
            update = update.with_message(last.message.clone());
        }
        self.publish(update).await;

        info!(
            campaign_id = %state.campaign_id,
            step = %step,
            ?outcome,
            assets = produced.len(),
            "Pipeline step finished"
        );

        StepReport {
            step,
            outcome,
            provider: provider.name().to_string(),
            assets: produced,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Builds the request of a single-call step, or `None` when its input is missing
    fn single_call_request(
        &self,
        step: PipelineStep,
        brief: &CampaignBrief,
        assets: &AvailableAssets,
        state: &RunState<'_>,
    ) -> Option<CallRequest> {
        match step {
            PipelineStep::Voiceover => {
                let mut params = TTSParams::new(brief.narration.trim())
                    .with_language(brief.language.clone());
                if let Some(voice) = &brief.voice_id {
                    params = params.with_voice(voice.clone());
                }
                Some(CallRequest::Speech(params))
            }
            PipelineStep::CinematicVideo => {
                let hero = assets.hero_image.as_ref()?;
                Some(CallRequest::Video(
                    VideoGenerationParams::new(brief.effective_cinematic_prompt(), &hero.url)
                        .with_kind(VideoKind::Cinematic)
                        .with_aspect_ratio(CINEMATIC_ASPECT_RATIO)
                        .with_duration(CINEMATIC_DURATION_SEC),
                ))
            }
            PipelineStep::AvatarVideo => {
                let presenter = assets
                    .presenter_image
                    .as_ref()
                    .map(|a| a.url.clone())
                    .or_else(|| self.config.default_presenter_url.clone())?;
                let mut params = AvatarVideoParams::new(brief.narration.trim(), presenter);
                match state.voiceover_url.as_deref() {
                    Some(audio) if is_fetchable_url(audio) => {
                        params = params.with_audio(audio);
                    }
                    Some(audio) => debug!(
                        campaign_id = %state.campaign_id,
                        audio,
                        "Voiceover is not reachable by the avatar provider, using the script"
                    ),
                    None => {}
                }
                Some(CallRequest::Avatar(params))
            }
            PipelineStep::VideoAd => None,
        }
    }

    fn missing_dependency_message(step: PipelineStep) -> &'static str {
        match step {
            PipelineStep::CinematicVideo => "Cinematic video requires a hero image",
            PipelineStep::AvatarVideo => "Avatar video requires a presenter image",
            _ => "Required input asset is missing",
        }
    }

    /// One call per platform; each call is gated and accounted separately
    async fn run_video_ads(
        &self,
        provider: &dyn GenerativeProvider,
        brief: &CampaignBrief,
        assets: &AvailableAssets,
        state: &mut RunState<'_>,
    ) -> (StepOutcome, Vec<GeneratedAsset>) {
        let step = PipelineStep::VideoAd;
        let platforms = brief.unique_platforms();
        let mut produced = Vec::new();
        let mut failed = false;
        let mut circuit_open = false;

        for platform in &platforms {
            let platform = *platform;
            if state.cancel.is_cancelled() {
                state.push_error(
                    step,
                    StepErrorKind::Cancelled,
                    Some(platform),
                    "Run cancelled before the platform call started",
                );
                failed = true;
                continue;
            }

            let Some(image) = assets.image_for(platform) else {
                state.push_error(
                    step,
                    StepErrorKind::DependencyMissing,
                    Some(platform),
                    format!("No source image for {}", platform),
                );
                continue;
            };

            let request = CallRequest::Video(
                VideoGenerationParams::new(&brief.video_prompt, &image.url)
                    .with_kind(VideoKind::Ad)
                    .with_aspect_ratio(platform.aspect_ratio()),
            );

            match self
                .gated_call(step, Some(platform), provider, request, state)
                .await
            {
                CallResult::Produced(asset) => produced.push(asset),
                CallResult::Skipped(_) => circuit_open = true,
                CallResult::Failed => failed = true,
            }
        }

        let outcome = if produced.len() == platforms.len() {
            StepOutcome::Completed
        } else if failed {
            StepOutcome::Failed
        } else if circuit_open {
            StepOutcome::CircuitOpen
        } else {
            StepOutcome::DependencyMissing
        };
        (outcome, produced)
    }

    /// Consults the circuit, calls the provider, and accounts the result
    async fn gated_call(
        &self,
        step: PipelineStep,
        platform: Option<Platform>,
        provider: &dyn GenerativeProvider,
        request: CallRequest,
        state: &mut RunState<'_>,
    ) -> CallResult {
        let provider_id = provider.name().to_string();

        if !self.gate.should_use(&provider_id) {
            state.push_error(
                step,
                StepErrorKind::CircuitOpen,
                platform,
                format!("Circuit open for provider {}", provider_id),
            );
            return CallResult::Skipped(StepOutcome::CircuitOpen);
        }

        let output = match self
            .call_with_limits(step, provider, &request, state.cancel)
            .await
        {
            Ok(output) => output,
            Err(failure) => {
                if failure.kind.counts_against_circuit() {
                    self.gate.record_failure(&provider_id);
                }
                state.push_error(step, failure.kind, platform, failure.message);
                return CallResult::Failed;
            }
        };
        self.gate.record_success(&provider_id);

        let media = ProducedMedia {
            step,
            platform,
            kind: step.output_kind(),
            payload: output.payload,
            mime_type: output.mime_type.clone(),
            duration_sec: output.duration_sec,
            provider: provider_id.clone(),
            provider_job_id: output.job_id,
        };

        match self.registry.register(state.campaign_id, media).await {
            Ok(asset) => CallResult::Produced(GeneratedAsset {
                asset,
                kind: step.output_kind(),
                platform,
                mime_type: output.mime_type,
                duration_sec: output.duration_sec,
                provider: provider_id,
            }),
            Err(e) => {
                state.push_error(step, StepErrorKind::Registration, platform, e.to_string());
                CallResult::Failed
            }
        }
    }

    /// Runs one provider call under the step timeout and the run's cancellation
    async fn call_with_limits(
        &self,
        step: PipelineStep,
        provider: &dyn GenerativeProvider,
        request: &CallRequest,
        cancel: &CancellationToken,
    ) -> Result<CallOutput, CallFailure> {
        let limit = self.config.timeouts.for_step(step);
        let submitted: Mutex<Option<VideoJobHandle>> = Mutex::new(None);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled(format!("{} call interrupted", step))),
            outcome = tokio::time::timeout(limit, self.call(provider, request, &submitted, cancel)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout(format!(
                        "{} call exceeded {}s",
                        step,
                        limit.as_secs_f64()
                    ))),
                }
            }
        };

        if let Err(e) = &result {
            if e.is_cancelled() || e.is_timeout() {
                let handle = submitted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(handle) = handle {
                    self.cancel_job(provider, &handle).await;
                }
            }
        }

        result.map_err(CallFailure::from)
    }

    async fn call(
        &self,
        provider: &dyn GenerativeProvider,
        request: &CallRequest,
        submitted: &Mutex<Option<VideoJobHandle>>,
        cancel: &CancellationToken,
    ) -> CoreResult<CallOutput> {
        let handle = match request {
            CallRequest::Speech(params) => {
                let speech = provider.generate_speech(params).await?;
                return Ok(CallOutput {
                    payload: MediaPayload::Bytes(speech.audio_data),
                    mime_type: speech.mime_type,
                    duration_sec: Some(speech.duration_sec),
                    job_id: None,
                });
            }
            CallRequest::Video(params) => provider.submit_video(params).await?,
            CallRequest::Avatar(params) => provider.submit_avatar(params).await?,
        };

        debug!(
            provider = %handle.provider,
            job_id = %handle.job_id,
            "Video job submitted"
        );
        *submitted.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        let video = wait_for_video(provider, &handle, self.config.poll, cancel).await?;
        Ok(CallOutput {
            payload: MediaPayload::Url(video.download_url),
            mime_type: "video/mp4".to_string(),
            duration_sec: video.duration_sec,
            job_id: Some(video.job.job_id),
        })
    }

    async fn cancel_job(&self, provider: &dyn GenerativeProvider, handle: &VideoJobHandle) {
        match provider.cancel_video(handle).await {
            Ok(()) => debug!(job_id = %handle.job_id, "Cancelled provider job"),
            Err(e) => warn!(
                job_id = %handle.job_id,
                "Failed to cancel provider job: {}",
                e
            ),
        }
    }

    async fn publish(&self, update: ProgressUpdate) {
        let stage = update.stage;
        if let Err(e) = self.sink.publish(update).await {
            warn!(stage = %stage, "Progress update failed: {}", e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
