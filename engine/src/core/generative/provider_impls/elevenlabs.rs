//! ElevenLabs Text-to-Speech Provider
//!
//! Adapter for the ElevenLabs speech synthesis API. Speech is synchronous:
//! one POST returns the encoded audio.

use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

use super::{api_error, build_client, execute_with_retry, network_error, validate_base_url};
use crate::core::generative::audio::{AudioFormat, TTSParams, TTSResult};
use crate::core::generative::providers::{GenerativeProvider, ProviderCapability};
use crate::core::settings::ElevenLabsSettings;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const PROVIDER_NAME: &str = "elevenlabs";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// API Request Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    language_code: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

// =============================================================================
// ElevenLabsProvider
// =============================================================================

/// ElevenLabs text-to-speech provider
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    default_voice_id: String,
    stability: f32,
    similarity_boost: f32,
}

impl std::fmt::Debug for ElevenLabsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsProvider")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("default_voice_id", &self.default_voice_id)
            .finish_non_exhaustive()
    }
}

impl ElevenLabsProvider {
    /// Create a new ElevenLabs provider
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        })
    }

    /// Create a provider from persisted settings
    pub fn from_settings(settings: &ElevenLabsSettings) -> CoreResult<Self> {
        let mut provider = Self::new(settings.api_key.clone().unwrap_or_default())?
            .with_model_id(&settings.model_id)
            .with_voice_id(&settings.voice_id);
        provider.stability = settings.stability;
        provider.similarity_boost = settings.similarity_boost;
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

    /// Set custom model ID
    pub fn with_model_id(mut self, model: impl Into<String>) -> Self {
        self.model_id = model.into();
        self
    }

    /// Set the voice used when params carry none
    pub fn with_voice_id(mut self, voice: impl Into<String>) -> Self {
        self.default_voice_id = voice.into();
        self
    }

    fn speech_url(&self, voice_id: &str, format: AudioFormat) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url,
            voice_id,
            Self::output_format(format)
        )
    }

    fn output_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::MP3 => "mp3_44100_128",
            AudioFormat::WAV => "pcm_44100",
        }
    }

    /// Extracts `detail.message` (or a string `detail`) from an error body
    fn parse_error_detail(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let detail = value.get("detail")?;
        match detail {
            serde_json::Value::String(s) => Some(s.clone()),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
        }
    }
}

#[async_trait]
impl GenerativeProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![ProviderCapability::TextToSpeech]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate_speech(&self, params: &TTSParams) -> CoreResult<TTSResult> {
        params.validate().map_err(CoreError::ValidationError)?;
        if !self.is_available() {
            return Err(CoreError::ProviderNotConfigured(PROVIDER_NAME.to_string()));
        }

        let voice_id = params
            .voice_id
            .as_deref()
            .unwrap_or(&self.default_voice_id);
        let url = self.speech_url(voice_id, params.format);
        let body = serde_json::to_vec(&SpeechRequest {
            text: &params.text,
            model_id: &self.model_id,
            language_code: &params.language,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
                speed: params.speed,
            },
        })?;

        let started = Instant::now();
        let audio = execute_with_retry("ElevenLabs", "speech", || {
            let request = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .header("Accept", params.format.mime_type())
                .body(body.clone());

            async move {
                let resp = request.send().await.map_err(network_error)?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(api_error(
                        "ElevenLabs",
                        status,
                        Self::parse_error_detail(&body),
                        &body,
                    ));
                }
                let bytes = resp.bytes().await.map_err(network_error)?;
                Ok(bytes.to_vec())
            }
        })
        .await?;

        if audio.is_empty() {
            return Err(CoreError::ProviderRequestFailed(
                "ElevenLabs returned empty audio".to_string(),
            ));
        }

        let generation_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "ElevenLabs speech generated: {} bytes in {}ms",
            audio.len(),
            generation_time_ms
        );

        Ok(TTSResult {
            id: ulid::Ulid::new().to_string(),
            audio_data: audio,
            mime_type: params.format.mime_type().to_string(),
            duration_sec: params.estimated_duration_sec(),
            model_used: self.model_id.clone(),
            generation_time_ms,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_and_capabilities() {
        let provider = ElevenLabsProvider::new("xi-key").unwrap();
        assert_eq!(provider.name(), "elevenlabs");
        assert!(provider.supports(ProviderCapability::TextToSpeech));
        assert!(!provider.supports(ProviderCapability::ImageToVideo));
    }

    #[test]
    fn test_provider_availability() {
        assert!(ElevenLabsProvider::new("xi-key").unwrap().is_available());
        assert!(!ElevenLabsProvider::new("").unwrap().is_available());
    }

    #[test]
    fn test_speech_url() {
        let provider = ElevenLabsProvider::new("xi-key").unwrap();
        assert_eq!(
            provider.speech_url("voice-1", AudioFormat::MP3),
            "https://api.elevenlabs.io/v1/text-to-speech/voice-1?output_format=mp3_44100_128"
        );

        let custom = provider.with_base_url("http://localhost:9000/").unwrap();
        assert!(custom
            .speech_url("v", AudioFormat::WAV)
            .starts_with("http://localhost:9000/v1/text-to-speech/v?"));
    }

    #[test]
    fn test_from_settings() {
        let settings = ElevenLabsSettings {
            api_key: Some("xi-key".to_string()),
            voice_id: "custom-voice".to_string(),
            ..ElevenLabsSettings::default()
        };
        let provider = ElevenLabsProvider::from_settings(&settings).unwrap();
        assert!(provider.is_available());
        assert_eq!(provider.default_voice_id, "custom-voice");

        let bad = ElevenLabsSettings {
            base_url: Some("ftp://example.com".to_string()),
            ..ElevenLabsSettings::default()
        };
        assert!(ElevenLabsProvider::from_settings(&bad).is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let provider = ElevenLabsProvider::new("super-secret").unwrap();
        assert!(!format!("{:?}", provider).contains("super-secret"));
    }

    #[test]
    fn test_parse_error_detail() {
        let structured = r#"{"detail":{"status":"quota_exceeded","message":"Quota exceeded"}}"#;
        assert_eq!(
            ElevenLabsProvider::parse_error_detail(structured).as_deref(),
            Some("Quota exceeded")
        );
        assert_eq!(
            ElevenLabsProvider::parse_error_detail(r#"{"detail":"Not found"}"#).as_deref(),
            Some("Not found")
        );
        assert!(ElevenLabsProvider::parse_error_detail("<html>").is_none());
    }

    #[test]
    fn test_request_serialization() {
        let req = SpeechRequest {
            text: "こんにちは",
            model_id: "eleven_multilingual_v2",
            language_code: "ja",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                speed: 1.0,
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_without_request() {
        let provider = ElevenLabsProvider::new("").unwrap();
        let err = provider
            .generate_speech(&TTSParams::new("こんにちは"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProviderNotConfigured(_)));
    }
}
