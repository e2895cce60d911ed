//! Broadcast Progress Sink
//!
//! Fans pipeline progress out to any number of in-process subscribers.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use kitgen_lib::core::pipeline::{ProgressSink, ProgressUpdate};
use kitgen_lib::core::{CoreError, CoreResult};

/// Default number of updates buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Progress sink backed by a `tokio::sync::broadcast` channel
///
/// Publishing never blocks. Subscribers that fall behind by more than the
/// channel capacity miss the oldest updates.
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    tx: broadcast::Sender<ProgressUpdate>,
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ProgressSink for BroadcastProgressSink {
    async fn publish(&self, update: ProgressUpdate) -> CoreResult<()> {
        match self.tx.send(update) {
            Ok(count) => debug!("Progress update sent to {} subscribers", count),
            // Nobody listening is not an error.
            Err(_) => debug!("Progress update dropped: no subscribers"),
        }
        Ok(())
    }
}

/// Serializes an update as a single JSON line
pub fn encode_progress_line(update: &ProgressUpdate) -> CoreResult<String> {
    serde_json::to_string(update)
        .map_err(|e| CoreError::Internal(format!("Failed to encode progress update: {}", e)))
}
