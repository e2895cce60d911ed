//! Voiceover Generation
//!
//! Parameters and results for campaign narration (text-to-speech).

use serde::{Deserialize, Serialize};

/// Maximum narration length accepted by the voiceover step
pub const MAX_NARRATION_CHARS: usize = 5_000;

/// Japanese narration pace used for duration estimates (characters per second)
const JA_CHARS_PER_SEC: f64 = 7.5;

/// Parameters for text-to-speech
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TTSParams {
    /// Text to convert to speech
    pub text: String,
    /// Voice ID to use (provider default when None)
    pub voice_id: Option<String>,
    /// Language code
    pub language: String,
    /// Speaking speed (0.7 - 1.2, 1.0 is normal)
    pub speed: f32,
    /// Output format
    pub format: AudioFormat,
}

impl TTSParams {
    /// Creates new TTS params for Japanese narration
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
            language: "ja".to_string(),
            speed: 1.0,
            format: AudioFormat::MP3,
        }
    }

    /// Sets the voice ID
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Sets the language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the speaking speed
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(0.7, 1.2);
        self
    }

    /// Validates the parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("Narration text cannot be empty".to_string());
        }

        let chars = self.text.chars().count();
        if chars > MAX_NARRATION_CHARS {
            return Err(format!(
                "Narration too long: {} characters (max {})",
                chars, MAX_NARRATION_CHARS
            ));
        }

        Ok(())
    }

    /// Rough spoken duration of the text
    pub fn estimated_duration_sec(&self) -> f64 {
        let chars = self.text.chars().filter(|c| !c.is_whitespace()).count() as f64;
        chars / JA_CHARS_PER_SEC / f64::from(self.speed.max(0.1))
    }
}

/// Audio output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    MP3,
    WAV,
}

impl AudioFormat {
    /// Returns the MIME type
    pub fn mime_type(&self) -> &str {
        match self {
            AudioFormat::MP3 => "audio/mpeg",
            AudioFormat::WAV => "audio/wav",
        }
    }
}

/// Result of TTS generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TTSResult {
    /// Unique result ID
    pub id: String,
    /// Generated audio data
    #[serde(skip_serializing, default)]
    pub audio_data: Vec<u8>,
    /// MIME type
    pub mime_type: String,
    /// Estimated audio duration in seconds
    pub duration_sec: f64,
    /// Model that was used
    pub model_used: String,
    /// Generation time in milliseconds
    pub generation_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params = TTSParams::new("新しい抹茶ラテ、今だけ半額。");
        assert_eq!(params.language, "ja");
        assert_eq!(params.format, AudioFormat::MP3);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        assert!(TTSParams::new("   ").validate().is_err());

        let long = "あ".repeat(MAX_NARRATION_CHARS + 1);
        let err = TTSParams::new(long).validate().unwrap_err();
        assert!(err.contains("too long"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // Multi-byte text at the limit is still valid.
        let text = "あ".repeat(MAX_NARRATION_CHARS);
        assert!(TTSParams::new(text).validate().is_ok());
    }

    #[test]
    fn test_speed_clamped() {
        assert_eq!(TTSParams::new("x").with_speed(3.0).speed, 1.2);
        assert_eq!(TTSParams::new("x").with_speed(0.1).speed, 0.7);
    }

    #[test]
    fn test_estimated_duration() {
        let params = TTSParams::new("あいうえおかきくけこさしすせそ");
        assert!((params.estimated_duration_sec() - 2.0).abs() < 1e-9);
    }
}
