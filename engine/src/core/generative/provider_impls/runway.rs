//! Runway Image-to-Video Provider
//!
//! Adapter for the Runway developer API. Generation is asynchronous:
//! `POST /v1/image_to_video` creates a task and `GET /v1/tasks/{id}` reports
//! its status.
//!
//! The provider id is configurable so one API account can back several
//! pipeline steps while each keeps its own circuit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{api_error, build_client, execute_with_retry, network_error, validate_base_url};
use crate::core::generative::providers::{GenerativeProvider, ProviderCapability};
use crate::core::generative::video::{
    VideoGenerationParams, VideoGenerationStatus, VideoJobHandle,
};
use crate::core::settings::RunwaySettings;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://api.dev.runwayml.com";

const DEFAULT_MODEL_ID: &str = "gen3a_turbo";

const DEFAULT_PROVIDER_ID: &str = "runway";

/// API version header value the request/response types match
const API_VERSION: &str = "2024-11-06";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoRequest {
    model: String,
    prompt_image: String,
    prompt_text: String,
    ratio: String,
    duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    output: Vec<String>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// RunwayProvider
// =============================================================================

/// Runway image-to-video provider
pub struct RunwayProvider {
    client: reqwest::Client,
    provider_id: String,
    api_key: String,
    base_url: String,
    model_id: String,
    duration_sec: u32,
}

impl std::fmt::Debug for RunwayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunwayProvider")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

impl RunwayProvider {
    /// Create a new Runway provider
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            duration_sec: 5,
        })
    }

    /// Create a provider from persisted settings
    pub fn from_settings(settings: &RunwaySettings) -> CoreResult<Self> {
        let mut provider = Self::new(settings.api_key.clone().unwrap_or_default())?
            .with_provider_id(&settings.provider_id)
            .with_model_id(&settings.model_id)
            .with_duration(settings.duration_sec);
        if let Some(url) = &settings.base_url {
            provider = provider.with_base_url(url)?;
        }
        Ok(provider)
    }

    /// Set the identifier used as circuit key and job handle provider
    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = id.into();
        self
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: &str) -> CoreResult<Self> {
        self.base_url = validate_base_url(url)?;
        Ok(self)
    }

    /// Set custom model ID
    pub fn with_model_id(mut self, model: impl Into<String>) -> Self {
        self.model_id = model.into();
        self
    }

    /// Set the clip length used when params ask for the default
    pub fn with_duration(mut self, duration_sec: u32) -> Self {
        self.duration_sec = if duration_sec >= 10 { 10 } else { 5 };
        self
    }

    fn submit_url(&self) -> String {
        format!("{}/v1/image_to_video", self.base_url)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/v1/tasks/{}", self.base_url, task_id)
    }

    /// Converts an aspect ratio to Runway's pixel ratio
    fn ratio_for(aspect_ratio: &str) -> &'static str {
        match aspect_ratio {
            "9:16" => "768:1280",
            "1:1" => "960:960",
            _ => "1280:768",
        }
    }

    fn build_request(&self, params: &VideoGenerationParams) -> ImageToVideoRequest {
        ImageToVideoRequest {
            model: self.model_id.clone(),
            prompt_image: params.source_image_url.clone(),
            prompt_text: params.prompt.clone(),
            ratio: Self::ratio_for(&params.aspect_ratio).to_string(),
            duration: self.clip_duration(params.duration_sec),
            seed: params.seed,
        }
    }

    /// Runway renders either 5 or 10 second clips
    fn clip_duration(&self, requested: u32) -> u32 {
        if requested >= 10 || self.duration_sec >= 10 {
            10
        } else {
            5
        }
    }

    fn parse_error_detail(body: &str) -> Option<String> {
        serde_json::from_str::<ApiErrorResponse>(body)
            .ok()
            .and_then(|resp| resp.error)
    }

    fn map_task_status(task: TaskResponse) -> CoreResult<VideoGenerationStatus> {
        match task.status.as_str() {
            "PENDING" | "THROTTLED" => Ok(VideoGenerationStatus::Queued),
            "RUNNING" => Ok(VideoGenerationStatus::Processing {
                progress: task.progress,
                message: None,
            }),
            "SUCCEEDED" => {
                let download_url = task.output.into_iter().next().ok_or_else(|| {
                    CoreError::ProviderRequestFailed(
                        "Runway task succeeded without output".to_string(),
                    )
                })?;
                Ok(VideoGenerationStatus::Completed {
                    download_url,
                    duration_sec: None,
                })
            }
            "FAILED" => Ok(VideoGenerationStatus::Failed {
                error: task
                    .failure
                    .unwrap_or_else(|| "Unknown error".to_string()),
                code: task.failure_code,
            }),
            "CANCELLED" => Ok(VideoGenerationStatus::Cancelled),
            other => {
                warn!("Unknown Runway task status: {}", other);
                Ok(VideoGenerationStatus::Processing {
                    progress: task.progress,
                    message: Some(format!("Unknown status: {}", other)),
                })
            }
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", API_VERSION)
    }
}

#[async_trait]
impl GenerativeProvider for RunwayProvider {
    fn name(&self) -> &str {
        &self.provider_id
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![ProviderCapability::ImageToVideo]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn submit_video(&self, params: &VideoGenerationParams) -> CoreResult<VideoJobHandle> {
        params.validate().map_err(CoreError::ValidationError)?;
        if !self.is_available() {
            return Err(CoreError::ProviderNotConfigured(self.provider_id.clone()));
        }

        let body = serde_json::to_vec(&self.build_request(params))?;
        let url = self.submit_url();

        let created = execute_with_retry("Runway", "submit", || {
            let request = self
                .request(reqwest::Method::POST, &url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            async move {
                let resp = request.send().await.map_err(network_error)?;
                let status = resp.status();
                let body = resp.text().await.map_err(network_error)?;
                if !status.is_success() {
                    return Err(api_error(
                        "Runway",
                        status,
                        Self::parse_error_detail(&body),
                        &body,
                    ));
                }
                serde_json::from_str::<CreateTaskResponse>(&body).map_err(|e| {
                    CoreError::ProviderRequestFailed(format!("Failed to parse response: {}", e))
                })
            }
        })
        .await?;

        info!(
            "Runway task submitted: provider={} task_id={} kind={}",
            self.provider_id, created.id, params.kind
        );

        Ok(VideoJobHandle {
            provider: self.provider_id.clone(),
            job_id: created.id,
            submitted_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> CoreResult<VideoGenerationStatus> {
        let url = self.task_url(&handle.job_id);

        let task = execute_with_retry("Runway", "poll", || {
            let request = self.request(reqwest::Method::GET, &url);

            async move {
                let resp = request.send().await.map_err(network_error)?;
                let status = resp.status();
                let body = resp.text().await.map_err(network_error)?;
                if !status.is_success() {
                    return Err(api_error(
                        "Runway",
                        status,
                        Self::parse_error_detail(&body),
                        &body,
                    ));
                }
                serde_json::from_str::<TaskResponse>(&body).map_err(|e| {
                    CoreError::ProviderRequestFailed(format!(
                        "Failed to parse task response: {}",
                        e
                    ))
                })
            }
        })
        .await?;

        debug!(
            "Runway poll for task {}: status={}",
            handle.job_id, task.status
        );
        Self::map_task_status(task)
    }

    async fn cancel_video(&self, handle: &VideoJobHandle) -> CoreResult<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &self.task_url(&handle.job_id))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(
                "Runway",
                status,
                Self::parse_error_detail(&body),
                &body,
            ));
        }

        info!("Runway task cancelled: task_id={}", handle.job_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn task(json: &str) -> TaskResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_provider_name_is_configurable() {
        let provider = RunwayProvider::new("key").unwrap();
        assert_eq!(provider.name(), "runway");

        let cinematic = provider.with_provider_id("runway-cinematic");
        assert_eq!(cinematic.name(), "runway-cinematic");
        assert!(cinematic.supports(ProviderCapability::ImageToVideo));
        assert!(!cinematic.supports(ProviderCapability::AvatarVideo));
    }

    #[test]
    fn test_url_building() {
        let provider = RunwayProvider::new("key").unwrap();
        assert_eq!(
            provider.submit_url(),
            "https://api.dev.runwayml.com/v1/image_to_video"
        );
        assert_eq!(
            provider.task_url("task-1"),
            "https://api.dev.runwayml.com/v1/tasks/task-1"
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = RunwaySettings {
            provider_id: "runway-cinematic".to_string(),
            api_key: Some("key".to_string()),
            base_url: Some("http://localhost:7000/".to_string()),
            model_id: "gen3a_turbo".to_string(),
            duration_sec: 10,
        };
        let provider = RunwayProvider::from_settings(&settings).unwrap();
        assert_eq!(provider.name(), "runway-cinematic");
        assert_eq!(provider.submit_url(), "http://localhost:7000/v1/image_to_video");
        assert_eq!(provider.clip_duration(5), 10);
    }

    #[test]
    fn test_ratio_mapping() {
        assert_eq!(RunwayProvider::ratio_for("16:9"), "1280:768");
        assert_eq!(RunwayProvider::ratio_for("9:16"), "768:1280");
        assert_eq!(RunwayProvider::ratio_for("1:1"), "960:960");
    }

    #[test]
    fn test_clip_duration() {
        let provider = RunwayProvider::new("key").unwrap();
        assert_eq!(provider.clip_duration(5), 5);
        assert_eq!(provider.clip_duration(7), 5);
        assert_eq!(provider.clip_duration(10), 10);
    }

    #[test]
    fn test_map_task_status() {
        assert_eq!(
            RunwayProvider::map_task_status(task(r#"{"status":"PENDING"}"#)).unwrap(),
            VideoGenerationStatus::Queued
        );
        assert_eq!(
            RunwayProvider::map_task_status(task(r#"{"status":"RUNNING","progress":0.4}"#))
                .unwrap(),
            VideoGenerationStatus::Processing {
                progress: Some(0.4),
                message: None
            }
        );
        assert_eq!(
            RunwayProvider::map_task_status(task(
                r#"{"status":"SUCCEEDED","output":["https://cdn/out.mp4"]}"#
            ))
            .unwrap(),
            VideoGenerationStatus::Completed {
                download_url: "https://cdn/out.mp4".to_string(),
                duration_sec: None
            }
        );
        assert_eq!(
            RunwayProvider::map_task_status(task(
                r#"{"status":"FAILED","failure":"moderation","failureCode":"SAFETY.INPUT"}"#
            ))
            .unwrap(),
            VideoGenerationStatus::Failed {
                error: "moderation".to_string(),
                code: Some("SAFETY.INPUT".to_string())
            }
        );
        assert_eq!(
            RunwayProvider::map_task_status(task(r#"{"status":"CANCELLED"}"#)).unwrap(),
            VideoGenerationStatus::Cancelled
        );
    }

    #[test]
    fn test_succeeded_without_output_is_error() {
        assert!(RunwayProvider::map_task_status(task(r#"{"status":"SUCCEEDED"}"#)).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let req = ImageToVideoRequest {
            model: "gen3a_turbo".to_string(),
            prompt_image: "https://cdn/hero.png".to_string(),
            prompt_text: "slow dolly in".to_string(),
            ratio: "1280:768".to_string(),
            duration: 5,
            seed: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"promptImage\":\"https://cdn/hero.png\""));
        assert!(json.contains("\"promptText\""));
        assert!(!json.contains("seed"));
    }

    #[test]
    fn test_build_request_from_params() {
        let provider = RunwayProvider::new("key").unwrap();
        let params = VideoGenerationParams::new("steam rising", "https://cdn/ig.png")
            .with_aspect_ratio("9:16")
            .with_duration(10)
            .with_seed(42);

        let json = serde_json::to_value(provider.build_request(&params)).unwrap();
        assert_eq!(json["ratio"], "768:1280");
        assert_eq!(json["duration"], 10);
        assert_eq!(json["seed"], 42);
        assert_eq!(json["promptImage"], "https://cdn/ig.png");
    }

    #[test]
    fn test_parse_error_detail() {
        assert_eq!(
            RunwayProvider::parse_error_detail(r#"{"error":"Invalid API key"}"#).as_deref(),
            Some("Invalid API key")
        );
        assert!(RunwayProvider::parse_error_detail("oops").is_none());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let provider = RunwayProvider::new("rw-secret").unwrap();
        assert!(!format!("{:?}", provider).contains("rw-secret"));
    }
}
