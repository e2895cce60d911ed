//! Pipeline Settings Persistence
//!
//! Provides persistent pipeline settings with:
//! - Atomic file writes (temp file + rename)
//! - Schema defaults for every field
//! - Normalization so a bad file never disables the pipeline
//! - Migration hook for schema changes
//!
//! Storage location: {settings_dir}/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::fs::atomic_write_json_pretty;
use crate::core::generative::polling::PollPolicy;
use crate::core::health::{BreakerConfig, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::core::pipeline::StepTimeouts;
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

// =============================================================================
// Root Settings
// =============================================================================

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Circuit breaker settings
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Per-step wall-clock timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Submit/poll settings for video jobs
    #[serde(default)]
    pub polling: PollingSettings,

    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProviderSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            breaker: BreakerSettings::default(),
            timeouts: TimeoutSettings::default(),
            polling: PollingSettings::default(),
            providers: ProviderSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Tolerant: corrects bad values instead of failing.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.breaker.failure_threshold = self.breaker.failure_threshold.clamp(1, 100);
        self.breaker.cooldown_secs = self.breaker.cooldown_secs.clamp(1, 86_400);

        self.timeouts.voiceover_secs = self.timeouts.voiceover_secs.clamp(5, 600);
        self.timeouts.video_secs = self.timeouts.video_secs.clamp(30, 3_600);
        self.timeouts.avatar_secs = self.timeouts.avatar_secs.clamp(30, 3_600);

        self.polling.interval_secs = self.polling.interval_secs.clamp(1, 60);
        self.polling.max_attempts = self.polling.max_attempts.clamp(1, 2_000);

        self.providers.normalize();
    }

    /// Circuit breaker parameters
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::new(
            self.breaker.failure_threshold,
            Duration::from_secs(self.breaker.cooldown_secs),
        )
    }

    /// Per-step timeouts
    pub fn step_timeouts(&self) -> StepTimeouts {
        StepTimeouts {
            voiceover: Duration::from_secs(self.timeouts.voiceover_secs),
            video_ad: Duration::from_secs(self.timeouts.video_secs),
            cinematic_video: Duration::from_secs(self.timeouts.video_secs),
            avatar_video: Duration::from_secs(self.timeouts.avatar_secs),
        }
    }

    /// Poll loop policy
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.polling.interval_secs),
            self.polling.max_attempts,
        )
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSettings {
    /// Consecutive failures that open a provider circuit (1-100, default 3)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds before an open circuit allows a trial call (1-86400, default 300)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN.as_secs()
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Per-step timeout settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    /// Voiceover call timeout in seconds (default 60)
    #[serde(default = "default_voiceover_secs")]
    pub voiceover_secs: u64,

    /// Video ad and cinematic call timeout in seconds (default 600)
    #[serde(default = "default_video_secs")]
    pub video_secs: u64,

    /// Avatar call timeout in seconds (default 900)
    #[serde(default = "default_avatar_secs")]
    pub avatar_secs: u64,
}

fn default_voiceover_secs() -> u64 {
    60
}

fn default_video_secs() -> u64 {
    600
}

fn default_avatar_secs() -> u64 {
    900
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            voiceover_secs: default_voiceover_secs(),
            video_secs: default_video_secs(),
            avatar_secs: default_avatar_secs(),
        }
    }
}

/// Video job polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollingSettings {
    /// Seconds between status polls (default 5)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Polls before the job is declared timed out (default 120)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    120
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Credentials and endpoints for each generation provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Voiceover (ElevenLabs)
    #[serde(default)]
    pub elevenlabs: ElevenLabsSettings,

    /// Video ads (Runway)
    #[serde(default = "default_runway_ads")]
    pub runway: RunwaySettings,

    /// Cinematic video (Runway, separate circuit)
    #[serde(default = "default_runway_cinematic")]
    pub runway_cinematic: RunwaySettings,

    /// Avatar video (D-ID)
    #[serde(default)]
    pub did: DidSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            elevenlabs: ElevenLabsSettings::default(),
            runway: default_runway_ads(),
            runway_cinematic: default_runway_cinematic(),
            did: DidSettings::default(),
        }
    }
}

impl ProviderSettings {
    fn normalize(&mut self) {
        for key in [
            &mut self.elevenlabs.api_key,
            &mut self.runway.api_key,
            &mut self.runway_cinematic.api_key,
            &mut self.did.api_key,
        ] {
            *key = key
                .take()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty());
        }

        self.elevenlabs.stability = clamp_f32(self.elevenlabs.stability, 0.0, 1.0);
        self.elevenlabs.similarity_boost = clamp_f32(self.elevenlabs.similarity_boost, 0.0, 1.0);

        for runway in [&mut self.runway, &mut self.runway_cinematic] {
            // Runway image-to-video accepts 5 or 10 second clips.
            runway.duration_sec = if runway.duration_sec >= 10 { 10 } else { 5 };
        }
        if self.runway.provider_id.trim().is_empty() {
            self.runway.provider_id = default_runway_ads().provider_id;
        }
        if self.runway_cinematic.provider_id.trim().is_empty() {
            self.runway_cinematic.provider_id = default_runway_cinematic().provider_id;
        }
    }
}

/// ElevenLabs text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElevenLabsSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Multilingual model handles Japanese narration
    #[serde(default = "default_elevenlabs_model")]
    pub model_id: String,
    /// Voice used when the brief does not pick one
    #[serde(default = "default_elevenlabs_voice")]
    pub voice_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
}

fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_elevenlabs_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

impl Default for ElevenLabsSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model_id: default_elevenlabs_model(),
            voice_id: default_elevenlabs_voice(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
        }
    }
}

/// Runway image-to-video settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunwaySettings {
    /// Circuit-breaker key for this Runway usage
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_runway_model")]
    pub model_id: String,
    /// Clip length (5 or 10)
    #[serde(default = "default_runway_duration")]
    pub duration_sec: u32,
}

fn default_runway_model() -> String {
    "gen3a_turbo".to_string()
}

fn default_runway_duration() -> u32 {
    5
}

fn default_runway_ads() -> RunwaySettings {
    RunwaySettings {
        provider_id: "runway".to_string(),
        api_key: None,
        base_url: None,
        model_id: default_runway_model(),
        duration_sec: default_runway_duration(),
    }
}

fn default_runway_cinematic() -> RunwaySettings {
    RunwaySettings {
        provider_id: "runway-cinematic".to_string(),
        duration_sec: 10,
        ..default_runway_ads()
    }
}

/// D-ID talking presenter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Presenter image used when the campaign has none
    #[serde(default)]
    pub default_presenter_url: Option<String>,
    /// Microsoft TTS voice D-ID uses for text scripts
    #[serde(default = "default_did_voice")]
    pub voice_id: String,
}

fn default_did_voice() -> String {
    "ja-JP-NanamiNeural".to_string()
}

impl Default for DidSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_presenter_url: None,
            voice_id: default_did_voice(),
        }
    }
}

fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Loads and saves [`PipelineSettings`] under a settings directory
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given directory
    pub fn new(settings_dir: impl AsRef<Path>) -> Self {
        Self {
            settings_path: settings_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(
        &self,
        exclusive: bool,
        op: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::SettingsError(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| {
                CoreError::SettingsError(format!("Failed to open settings lock file: {}", e))
            })?;

        let locked = if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
        } else {
            fs2::FileExt::lock_shared(&lock_file)
        };
        locked.map_err(|e| CoreError::SettingsError(format!("Failed to lock settings: {}", e)))?;

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> PipelineSettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                PipelineSettings::default()
            }
        }
    }

    /// Load settings from disk, surfacing read and parse errors
    pub fn try_load(&self) -> CoreResult<PipelineSettings> {
        self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(PipelineSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<PipelineSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        })
    }

    /// Save settings to disk atomically, returning the normalized copy written
    pub fn save(&self, settings: &PipelineSettings) -> CoreResult<PipelineSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();
            atomic_write_json_pretty(&self.settings_path, &normalized)?;
            Ok(normalized)
        })
    }
}

/// Upgrades settings from older schema versions
fn migrate(settings: PipelineSettings) -> PipelineSettings {
    // Version 0 files predate the schema field; defaults fill any gaps.
    PipelineSettings {
        version: SETTINGS_VERSION,
        ..settings
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.breaker.failure_threshold, 3);
        assert_eq!(settings.breaker.cooldown_secs, 300);
        assert_eq!(settings.timeouts.voiceover_secs, 60);
        assert_eq!(settings.providers.runway.provider_id, "runway");
        assert_eq!(
            settings.providers.runway_cinematic.provider_id,
            "runway-cinematic"
        );
        assert_eq!(settings.providers.runway_cinematic.duration_sec, 10);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let settings: PipelineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let json = r#"{"breaker": {"failureThreshold": 5}}"#;
        let settings: PipelineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.breaker.failure_threshold, 5);
        assert_eq!(settings.breaker.cooldown_secs, 300);
        assert_eq!(settings.polling.max_attempts, 120);
    }

    #[test]
    fn test_normalize_clamps_values() {
        let mut settings = PipelineSettings::default();
        settings.breaker.failure_threshold = 0;
        settings.breaker.cooldown_secs = 0;
        settings.polling.interval_secs = 3_600;
        settings.providers.elevenlabs.stability = f32::NAN;
        settings.providers.runway.duration_sec = 7;
        settings.providers.did.api_key = Some("   ".to_string());
        settings.providers.runway.provider_id = " ".to_string();

        settings.normalize();

        assert_eq!(settings.breaker.failure_threshold, 1);
        assert_eq!(settings.breaker.cooldown_secs, 1);
        assert_eq!(settings.polling.interval_secs, 60);
        assert_eq!(settings.providers.elevenlabs.stability, 0.0);
        assert_eq!(settings.providers.runway.duration_sec, 5);
        assert!(settings.providers.did.api_key.is_none());
        assert_eq!(settings.providers.runway.provider_id, "runway");
    }

    #[test]
    fn test_conversions() {
        let mut settings = PipelineSettings::default();
        settings.breaker.failure_threshold = 4;
        settings.breaker.cooldown_secs = 120;
        settings.polling.interval_secs = 2;
        settings.polling.max_attempts = 30;

        let breaker = settings.breaker_config();
        assert_eq!(breaker.failure_threshold, 4);
        assert_eq!(breaker.cooldown, Duration::from_secs(120));

        let poll = settings.poll_policy();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.max_attempts, 30);

        let timeouts = settings.step_timeouts();
        assert_eq!(timeouts.voiceover, Duration::from_secs(60));
        assert_eq!(timeouts.avatar_video, Duration::from_secs(900));
    }

    #[test]
    fn test_manager_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        assert_eq!(manager.load(), PipelineSettings::default());
    }

    #[test]
    fn test_manager_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());

        let mut settings = PipelineSettings::default();
        settings.breaker.failure_threshold = 5;
        settings.providers.elevenlabs.api_key = Some("  xi-test  ".to_string());

        let saved = manager.save(&settings).unwrap();
        assert_eq!(saved.providers.elevenlabs.api_key.as_deref(), Some("xi-test"));

        let loaded = manager.load();
        assert_eq!(loaded, saved);
        assert!(manager.settings_path().exists());
    }

    #[test]
    fn test_manager_corrupt_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(manager.settings_path(), "{ this is not json").unwrap();

        assert!(manager.try_load().is_err());
        assert_eq!(manager.load(), PipelineSettings::default());
    }

    #[test]
    fn test_manager_migrates_old_version() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(
            manager.settings_path(),
            r#"{"version": 0, "polling": {"intervalSecs": 10}}"#,
        )
        .unwrap();

        let loaded = manager.load();
        assert_eq!(loaded.version, SETTINGS_VERSION);
        assert_eq!(loaded.polling.interval_secs, 10);
    }
}
