//! Video Job Polling
//!
//! Drives a submitted video job to a terminal state. Polling stops early
//! when the cancellation token fires.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::providers::GenerativeProvider;
use super::video::{VideoGenerationResult, VideoGenerationStatus, VideoJobHandle};
use crate::core::{CoreError, CoreResult};

/// How often and how long to poll a video job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between status polls
    pub interval: Duration,
    /// Polls before the job is declared timed out
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 120)
    }
}

/// Polls `handle` until the job completes, fails, or the policy runs out.
///
/// The first poll happens immediately. Transient poll errors count as an
/// attempt and are retried on the next tick.
pub async fn wait_for_video(
    provider: &dyn GenerativeProvider,
    handle: &VideoJobHandle,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> CoreResult<VideoGenerationResult> {
    let started = Instant::now();
    let mut last_error: Option<CoreError> = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled(format!(
                "Polling of job {} cancelled",
                handle.job_id
            )));
        }

        match provider.poll_video(handle).await {
            Ok(VideoGenerationStatus::Completed {
                download_url,
                duration_sec,
            }) => {
                return Ok(VideoGenerationResult {
                    job: handle.clone(),
                    download_url,
                    duration_sec,
                    polls: attempt,
                    generation_time_ms: started.elapsed().as_millis() as u64,
                });
            }
            Ok(VideoGenerationStatus::Failed { error, code }) => {
                return Err(CoreError::GenerationFailed {
                    provider: handle.provider.clone(),
                    message: error,
                    code,
                });
            }
            Ok(VideoGenerationStatus::Cancelled) => {
                return Err(CoreError::GenerationCancelled(format!(
                    "Job {} was cancelled by {}",
                    handle.job_id, handle.provider
                )));
            }
            Ok(status) => {
                debug!(
                    provider = %handle.provider,
                    job_id = %handle.job_id,
                    attempt,
                    ?status,
                    "Video job still running"
                );
                last_error = None;
            }
            Err(e) => {
                debug!(
                    provider = %handle.provider,
                    job_id = %handle.job_id,
                    attempt,
                    "Poll failed: {}",
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CoreError::Cancelled(format!(
                        "Polling of job {} cancelled",
                        handle.job_id
                    )));
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Err(match last_error {
        Some(e) => e,
        None => CoreError::Timeout(format!(
            "Job {} did not finish after {} polls",
            handle.job_id, policy.max_attempts
        )),
    })
}
