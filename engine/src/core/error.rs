//! KitGen Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::{CampaignId, ProviderId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(ProviderId),

    #[error("Generation job failed ({provider}): {message}")]
    GenerationFailed {
        provider: ProviderId,
        message: String,
        code: Option<String>,
    },

    #[error("Generation job cancelled by provider: {0}")]
    GenerationCancelled(String),

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("No pipeline steps enabled for campaign {0}")]
    NoStepsEnabled(CampaignId),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Asset registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Progress update failed: {0}")]
    ProgressUpdateFailed(String),

    // =========================================================================
    // Settings Errors
    // =========================================================================
    #[error("Settings error: {0}")]
    SettingsError(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether the error means the provider never reached a terminal state in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout(_))
    }

    /// Whether the error came from caller-side cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled(_))
    }
}
