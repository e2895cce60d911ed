//! Generative Provider Implementations
//!
//! HTTP adapters for the generation services used by the pipeline, plus the
//! request plumbing they share (retry with backoff, error-body parsing,
//! base URL validation).

pub mod did;
pub mod elevenlabs;
pub mod runway;

pub use did::DidAvatarProvider;
pub use elevenlabs::ElevenLabsProvider;
pub use runway::RunwayProvider;

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::core::{CoreError, CoreResult};

/// Maximum attempts for one logical request
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Longest error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Builds the HTTP client an adapter keeps for its lifetime.
pub(crate) fn build_client(timeout: Duration) -> CoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Validates an API base URL and strips any trailing slash.
pub(crate) fn validate_base_url(url: &str) -> CoreResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| {
        CoreError::ValidationError(format!("Invalid base URL '{}': {}", trimmed, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(CoreError::ValidationError(format!(
            "Unsupported base URL scheme '{}'. Only http/https are allowed.",
            scheme
        ))),
    }
}

/// Maps a transport error, keeping timeouts recognizable for retry.
pub(crate) fn network_error(e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        CoreError::ProviderRequestFailed(format!("Network timeout: {}", e))
    } else {
        CoreError::ProviderRequestFailed(format!("Network error: {}", e))
    }
}

/// Returns true when an error is likely transient and should be retried.
pub(crate) fn is_retryable_error(error: &CoreError) -> bool {
    let CoreError::ProviderRequestFailed(message) = error else {
        return false;
    };

    let lowered = message.to_ascii_lowercase();
    lowered.contains("(429")
        || lowered.contains("(500")
        || lowered.contains("(502")
        || lowered.contains("(503")
        || lowered.contains("(504")
        || lowered.contains("timeout")
        || lowered.contains("temporarily unavailable")
}

/// Formats a non-success response as a provider error.
///
/// `detail` is whatever message the caller could extract from a structured
/// error body; otherwise the raw body is truncated into the message.
pub(crate) fn api_error(
    provider: &str,
    status: StatusCode,
    detail: Option<String>,
    body: &str,
) -> CoreError {
    let message = detail.unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect());
    CoreError::ProviderRequestFailed(format!("{} API error ({}): {}", provider, status, message))
}

/// Executes an HTTP request with retries and exponential backoff.
pub(crate) async fn execute_with_retry<F, Fut, T>(
    provider: &str,
    operation: &str,
    f: F,
) -> CoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !is_retryable_error(&e) || attempt >= MAX_RETRIES {
                    return Err(e);
                }

                let delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(
                    "{} {} attempt {} failed, retrying in {}ms: {}",
                    provider, operation, attempt, delay, e
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url("https://api.example.com/v1/").unwrap(),
            "https://api.example.com/v1"
        );
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("file:///etc/passwd").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn test_is_retryable_error() {
        let err = api_error("Runway", StatusCode::TOO_MANY_REQUESTS, None, "slow down");
        assert!(is_retryable_error(&err));

        let err = api_error("Runway", StatusCode::SERVICE_UNAVAILABLE, None, "");
        assert!(is_retryable_error(&err));

        let err = CoreError::ProviderRequestFailed("Network timeout: deadline".into());
        assert!(is_retryable_error(&err));

        let err = api_error("Runway", StatusCode::BAD_REQUEST, Some("bad prompt".into()), "");
        assert!(!is_retryable_error(&err));

        assert!(!is_retryable_error(&CoreError::ValidationError(
            "timeout".into()
        )));
    }

    #[test]
    fn test_api_error_truncates_body() {
        let body = "x".repeat(2_000);
        let err = api_error("D-ID", StatusCode::INTERNAL_SERVER_ERROR, None, &body);
        assert!(err.to_string().len() < 600);
        assert!(err.to_string().contains("D-ID API error (500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = execute_with_retry("Test", "submit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::ProviderRequestFailed("invalid key".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry("Test", "poll", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::ProviderRequestFailed(
                        "Test API error (503 Service Unavailable): busy".into(),
                    ))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = execute_with_retry("Test", "poll", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::ProviderRequestFailed("Network timeout".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES);
    }
}
