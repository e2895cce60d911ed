//! Generative AI Providers
//!
//! Provider abstraction for the generation services the pipeline calls.
//! The provider's `name()` doubles as its circuit-breaker key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::audio::{TTSParams, TTSResult};
use super::video::{
    AvatarVideoParams, VideoGenerationParams, VideoGenerationStatus, VideoJobHandle,
};
use crate::core::{CoreError, CoreResult};

/// Capabilities supported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapability {
    /// Text-to-speech
    TextToSpeech,
    /// Image-to-video
    ImageToVideo,
    /// Talking presenter video
    AvatarVideo,
}

impl std::fmt::Display for ProviderCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderCapability::TextToSpeech => write!(f, "Text-to-Speech"),
            ProviderCapability::ImageToVideo => write!(f, "Image-to-Video"),
            ProviderCapability::AvatarVideo => write!(f, "Avatar Video"),
        }
    }
}

/// Trait for generative AI providers
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Returns the provider name (circuit-breaker key)
    fn name(&self) -> &str;

    /// Returns supported capabilities
    fn capabilities(&self) -> Vec<ProviderCapability>;

    /// Checks if provider supports a capability
    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Checks if the provider is available (configured correctly)
    fn is_available(&self) -> bool;

    /// Generates speech from text
    async fn generate_speech(&self, _params: &TTSParams) -> CoreResult<TTSResult> {
        Err(CoreError::NotSupported(format!(
            "{} does not support text-to-speech",
            self.name()
        )))
    }

    /// Submits an image-to-video job
    async fn submit_video(&self, _params: &VideoGenerationParams) -> CoreResult<VideoJobHandle> {
        Err(CoreError::NotSupported(format!(
            "{} does not support image-to-video",
            self.name()
        )))
    }

    /// Submits a talking-presenter job
    async fn submit_avatar(&self, _params: &AvatarVideoParams) -> CoreResult<VideoJobHandle> {
        Err(CoreError::NotSupported(format!(
            "{} does not support avatar video",
            self.name()
        )))
    }

    /// Polls a submitted job
    async fn poll_video(&self, _handle: &VideoJobHandle) -> CoreResult<VideoGenerationStatus> {
        Err(CoreError::NotSupported(format!(
            "{} does not support video jobs",
            self.name()
        )))
    }

    /// Cancels a submitted job (best effort)
    async fn cancel_video(&self, _handle: &VideoJobHandle) -> CoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Mock Provider for Testing
// ============================================================================

/// Scripted behavior of a [`MockGenerativeProvider`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Every call succeeds; video jobs complete on the first poll
    Succeed,
    /// Video jobs complete after the given number of polls
    CompleteAfterPolls(u32),
    /// Speech and submit calls fail immediately
    FailRequest(String),
    /// Submit succeeds, the job then fails on the first poll
    FailJob(String),
    /// Jobs stay in processing forever
    NeverComplete,
    /// Speech and submit calls never return
    Hang,
}

/// Mock provider for testing and simulated runs
#[derive(Debug)]
pub struct MockGenerativeProvider {
    name: String,
    capabilities: Vec<ProviderCapability>,
    available: bool,
    behavior: Mutex<MockBehavior>,
    latency: Duration,
    speech_calls: AtomicU32,
    submit_calls: AtomicU32,
    poll_calls: AtomicU32,
    cancel_calls: AtomicU32,
    job_polls: Mutex<HashMap<String, u32>>,
}

impl MockGenerativeProvider {
    /// Creates a new mock provider that always succeeds
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: vec![
                ProviderCapability::TextToSpeech,
                ProviderCapability::ImageToVideo,
                ProviderCapability::AvatarVideo,
            ],
            available: true,
            behavior: Mutex::new(MockBehavior::Succeed),
            latency: Duration::ZERO,
            speech_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            job_polls: Mutex::new(HashMap::new()),
        }
    }

    /// Sets availability
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Sets capabilities
    pub fn with_capabilities(mut self, caps: Vec<ProviderCapability>) -> Self {
        self.capabilities = caps;
        self
    }

    /// Sets the scripted behavior
    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Adds latency to speech and submit calls
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Changes the scripted behavior of a shared mock
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    fn behavior(&self) -> MockBehavior {
        self.behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Speech calls made so far
    pub fn speech_calls(&self) -> u32 {
        self.speech_calls.load(Ordering::SeqCst)
    }

    /// Video and avatar submissions made so far
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Polls made so far
    pub fn poll_calls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Cancellations requested so far
    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Total provider requests of any kind
    pub fn total_calls(&self) -> u32 {
        self.speech_calls() + self.submit_calls() + self.poll_calls()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn submit(&self) -> CoreResult<VideoJobHandle> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        match self.behavior() {
            MockBehavior::FailRequest(message) => {
                return Err(CoreError::ProviderRequestFailed(message))
            }
            MockBehavior::Hang => return std::future::pending().await,
            _ => {}
        }

        Ok(VideoJobHandle {
            provider: self.name.clone(),
            job_id: ulid::Ulid::new().to_string(),
            submitted_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[async_trait]
impl GenerativeProvider for MockGenerativeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        self.capabilities.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate_speech(&self, params: &TTSParams) -> CoreResult<TTSResult> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        if !self.supports(ProviderCapability::TextToSpeech) {
            return Err(CoreError::NotSupported("TTS not supported".to_string()));
        }
        self.simulate_latency().await;

        match self.behavior() {
            MockBehavior::FailRequest(message) | MockBehavior::FailJob(message) => {
                Err(CoreError::ProviderRequestFailed(message))
            }
            // Speech is synchronous, so a job that never completes is a request that hangs.
            MockBehavior::NeverComplete | MockBehavior::Hang => {
                std::future::pending::<CoreResult<TTSResult>>().await
            }
            MockBehavior::Succeed | MockBehavior::CompleteAfterPolls(_) => Ok(TTSResult {
                id: ulid::Ulid::new().to_string(),
                audio_data: vec![0u8; 100],
                mime_type: params.format.mime_type().to_string(),
                duration_sec: params.estimated_duration_sec(),
                model_used: "mock-tts".to_string(),
                generation_time_ms: self.latency.as_millis() as u64,
            }),
        }
    }

    async fn submit_video(&self, _params: &VideoGenerationParams) -> CoreResult<VideoJobHandle> {
        if !self.supports(ProviderCapability::ImageToVideo) {
            return Err(CoreError::NotSupported(
                "Image-to-video not supported".to_string(),
            ));
        }
        self.submit().await
    }

    async fn submit_avatar(&self, _params: &AvatarVideoParams) -> CoreResult<VideoJobHandle> {
        if !self.supports(ProviderCapability::AvatarVideo) {
            return Err(CoreError::NotSupported(
                "Avatar video not supported".to_string(),
            ));
        }
        self.submit().await
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> CoreResult<VideoGenerationStatus> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);

        let polls = {
            let mut job_polls = self.job_polls.lock().unwrap_or_else(PoisonError::into_inner);
            let count = job_polls.entry(handle.job_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let status = match self.behavior() {
            MockBehavior::Succeed => completed(handle),
            MockBehavior::CompleteAfterPolls(n) if polls >= n => completed(handle),
            MockBehavior::CompleteAfterPolls(n) => VideoGenerationStatus::Processing {
                progress: Some(f64::from(polls) / f64::from(n)),
                message: None,
            },
            MockBehavior::FailJob(error) | MockBehavior::FailRequest(error) => {
                VideoGenerationStatus::Failed { error, code: None }
            }
            MockBehavior::NeverComplete | MockBehavior::Hang => VideoGenerationStatus::Processing {
                progress: None,
                message: Some("rendering".to_string()),
            },
        };
        Ok(status)
    }

    async fn cancel_video(&self, _handle: &VideoJobHandle) -> CoreResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn completed(handle: &VideoJobHandle) -> VideoGenerationStatus {
    VideoGenerationStatus::Completed {
        download_url: format!("https://mock.invalid/{}/{}.mp4", handle.provider, handle.job_id),
        duration_sec: Some(5.0),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_display() {
        assert_eq!(
            ProviderCapability::TextToSpeech.to_string(),
            "Text-to-Speech"
        );
        assert_eq!(ProviderCapability::AvatarVideo.to_string(), "Avatar Video");
    }

    #[test]
    fn test_capability_serialization() {
        assert_eq!(
            serde_json::to_string(&ProviderCapability::ImageToVideo).unwrap(),
            "\"image_to_video\""
        );
    }

    #[test]
    fn test_mock_provider_new() {
        let provider = MockGenerativeProvider::new("mock");
        assert_eq!(provider.name(), "mock");
        assert!(provider.is_available());
        assert!(provider.supports(ProviderCapability::TextToSpeech));
        assert!(!MockGenerativeProvider::new("x")
            .with_available(false)
            .is_available());
    }

    #[tokio::test]
    async fn test_mock_speech_success() {
        let provider = MockGenerativeProvider::new("mock");
        let result = provider
            .generate_speech(&TTSParams::new("こんにちは"))
            .await
            .unwrap();

        assert!(!result.audio_data.is_empty());
        assert_eq!(result.mime_type, "audio/mpeg");
        assert_eq!(provider.speech_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_speech_failure() {
        let provider = MockGenerativeProvider::new("mock")
            .with_behavior(MockBehavior::FailRequest("quota exceeded".into()));
        let err = provider
            .generate_speech(&TTSParams::new("こんにちは"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_mock_complete_after_polls_tracks_jobs_separately() {
        let provider =
            MockGenerativeProvider::new("mock").with_behavior(MockBehavior::CompleteAfterPolls(2));
        let params = VideoGenerationParams::new("p", "u");
        let a = provider.submit_video(&params).await.unwrap();
        let b = provider.submit_video(&params).await.unwrap();

        assert!(!provider.poll_video(&a).await.unwrap().is_terminal());
        assert!(!provider.poll_video(&b).await.unwrap().is_terminal());
        assert!(provider.poll_video(&a).await.unwrap().is_terminal());
        assert_eq!(provider.submit_calls(), 2);
        assert_eq!(provider.poll_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_unsupported_capability() {
        let provider = MockGenerativeProvider::new("tts-only")
            .with_capabilities(vec![ProviderCapability::TextToSpeech]);
        let result = provider
            .submit_avatar(&AvatarVideoParams::new("s", "u"))
            .await;
        assert!(matches!(result, Err(CoreError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_mock_behavior_can_change() {
        let provider = MockGenerativeProvider::new("mock");
        provider.set_behavior(MockBehavior::FailJob("nsfw".into()));
        let handle = provider
            .submit_video(&VideoGenerationParams::new("p", "u"))
            .await
            .unwrap();
        let status = provider.poll_video(&handle).await.unwrap();
        assert!(matches!(status, VideoGenerationStatus::Failed { .. }));
    }
}
