//! D-ID Talking Presenter Provider
//!
//! Adapter for the D-ID Talks API. A talk animates a presenter image with
//! either a text script (spoken by a Microsoft neural voice) or a
//! pre-rendered audio track.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{api_error, build_client, execute_with_retry, network_error, validate_base_url};
use crate::core::generative::providers::{GenerativeProvider, ProviderCapability};
use crate::core::generative::video::{AvatarVideoParams, VideoGenerationStatus, VideoJobHandle};
use crate::core::settings::DidSettings;
use crate::core::{CoreError, CoreResult};

const DEFAULT_BASE_URL: &str = "https://api.d-id.com";

const DEFAULT_VOICE_ID: &str = "ja-JP-NanamiNeural";

const PROVIDER_NAME: &str = "d-id";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateTalkRequest {
    source_url: String,
    script: TalkScript,
    config: TalkConfig,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TalkScript {
    Text {
        input: String,
        provider: VoiceProvider,
    },
    Audio {
        audio_url: String,
    },
}

#[derive(Debug, Serialize)]
struct VoiceProvider {
    #[serde(rename = "type")]
    kind: &'static str,
    voice_id: String,
}

#[derive(Debug, Serialize)]
struct TalkConfig {
    fluent: bool,
    stitch: bool,
}

#[derive(Debug, Deserialize)]
struct CreateTalkResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TalkResponse {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error: Option<TalkError>,
}

#[derive(Debug, Deserialize)]
struct TalkError {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

// =============================================================================
// DidAvatarProvider
// =============================================================================

/// D-ID talking presenter provider
pub struct DidAvatarProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
}

impl std::fmt::Debug for DidAvatarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DidAvatarProvider")
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .finish_non_exhaustive()
    }
}

impl DidAvatarProvider {
    /// Create a new D-ID provider
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
        })
    }

    /// Create a provider from persisted settings
    pub fn from_settings(settings: &DidSettings) -> CoreResult<Self> {
        let mut provider = Self::new(settings.api_key.clone().unwrap_or_default())?
            .with_voice_id(&settings.voice_id);
        if let Some(url) = &settings.base_url {
            provider = provider.with_base_url(url)?;
        }
        Ok(provider)
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: &str) -> CoreResult<Self> {
        self.base_url = validate_base_url(url)?;
        Ok(self)
    }

    /// Set the voice used for text scripts
    pub fn with_voice_id(mut self, voice: impl Into<String>) -> Self {
        self.voice_id = voice.into();
        self
    }

    fn talks_url(&self) -> String {
        format!("{}/talks", self.base_url)
    }

    fn talk_url(&self, talk_id: &str) -> String {
        format!("{}/talks/{}", self.base_url, talk_id)
    }

    fn build_request(&self, params: &AvatarVideoParams) -> CreateTalkRequest {
        let script = match &params.audio_url {
            Some(audio_url) => TalkScript::Audio {
                audio_url: audio_url.clone(),
            },
            None => TalkScript::Text {
                input: params.script.clone(),
                provider: VoiceProvider {
                    kind: "microsoft",
                    voice_id: params
                        .voice_id
                        .clone()
                        .unwrap_or_else(|| self.voice_id.clone()),
                },
            },
        };

        CreateTalkRequest {
            source_url: params.presenter_image_url.clone(),
            script,
            config: TalkConfig {
                fluent: true,
                stitch: true,
            },
        }
    }

    fn parse_error_detail(body: &str) -> Option<String> {
        let resp = serde_json::from_str::<ApiErrorResponse>(body).ok()?;
        match (resp.kind, resp.description) {
            (Some(kind), Some(description)) => Some(format!("{}: {}", kind, description)),
            (kind, description) => description.or(kind),
        }
    }

    fn map_talk_status(talk: TalkResponse) -> CoreResult<VideoGenerationStatus> {
        match talk.status.as_str() {
            "created" => Ok(VideoGenerationStatus::Queued),
            "started" => Ok(VideoGenerationStatus::Processing {
                progress: None,
                message: None,
            }),
            "done" => {
                let download_url = talk.result_url.ok_or_else(|| {
                    CoreError::ProviderRequestFailed(
                        "D-ID talk finished without result_url".to_string(),
                    )
                })?;
                Ok(VideoGenerationStatus::Completed {
                    download_url,
                    duration_sec: talk.duration,
                })
            }
            "error" | "rejected" => {
                let (error, code) = match talk.error {
                    Some(err) => (
                        err.description
                            .unwrap_or_else(|| format!("Talk {}", talk.status)),
                        err.kind,
                    ),
                    None => (format!("Talk {}", talk.status), None),
                };
                Ok(VideoGenerationStatus::Failed { error, code })
            }
            other => {
                warn!("Unknown D-ID talk status: {}", other);
                Ok(VideoGenerationStatus::Processing {
                    progress: None,
                    message: Some(format!("Unknown status: {}", other)),
                })
            }
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Basic {}", self.api_key))
    }
}

#[async_trait]
impl GenerativeProvider for DidAvatarProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![ProviderCapability::AvatarVideo]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn submit_avatar(&self, params: &AvatarVideoParams) -> CoreResult<VideoJobHandle> {
        params.validate().map_err(CoreError::ValidationError)?;
        if !self.is_available() {
            return Err(CoreError::ProviderNotConfigured(PROVIDER_NAME.to_string()));
        }

        let body = serde_json::to_vec(&self.build_request(params))?;
        let url = self.talks_url();

        let created = execute_with_retry("D-ID", "submit", || {
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
                        "D-ID",
                        status,
                        Self::parse_error_detail(&body),
                        &body,
                    ));
                }
                serde_json::from_str::<CreateTalkResponse>(&body).map_err(|e| {
                    CoreError::ProviderRequestFailed(format!("Failed to parse response: {}", e))
                })
            }
        })
        .await?;

        info!(
            "D-ID talk submitted: talk_id={} audio={}",
            created.id,
            params.audio_url.is_some()
        );

        Ok(VideoJobHandle {
            provider: PROVIDER_NAME.to_string(),
            job_id: created.id,
            submitted_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> CoreResult<VideoGenerationStatus> {
        let url = self.talk_url(&handle.job_id);

        let talk = execute_with_retry("D-ID", "poll", || {
            let request = self.request(reqwest::Method::GET, &url);

            async move {
                let resp = request.send().await.map_err(network_error)?;
                let status = resp.status();
                let body = resp.text().await.map_err(network_error)?;
                if !status.is_success() {
                    return Err(api_error(
                        "D-ID",
                        status,
                        Self::parse_error_detail(&body),
                        &body,
                    ));
                }
                serde_json::from_str::<TalkResponse>(&body).map_err(|e| {
                    CoreError::ProviderRequestFailed(format!(
                        "Failed to parse talk response: {}",
                        e
                    ))
                })
            }
        })
        .await?;

        debug!("D-ID poll for talk {}: status={}", handle.job_id, talk.status);
        Self::map_talk_status(talk)
    }

    async fn cancel_video(&self, handle: &VideoJobHandle) -> CoreResult<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &self.talk_url(&handle.job_id))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(
                "D-ID",
                status,
                Self::parse_error_detail(&body),
                &body,
            ));
        }

        info!("D-ID talk deleted: talk_id={}", handle.job_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
