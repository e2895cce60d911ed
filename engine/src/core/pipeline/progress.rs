//! Pipeline Progress
//!
//! Per-stage status updates pushed while a run executes, and an in-memory
//! store that folds them into per-campaign progress records.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::PipelineStep;
use crate::core::{CampaignId, CoreResult};

/// Status of one pipeline stage as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Generating,
    Complete,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Complete | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

/// A single stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub campaign_id: CampaignId,
    pub stage: PipelineStep,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(campaign_id: impl Into<CampaignId>, stage: PipelineStep, status: StageStatus) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            stage,
            status,
            message: None,
            at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Progress record of one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgress {
    pub campaign_id: CampaignId,
    pub stages: BTreeMap<PipelineStep, StageStatus>,
    /// Latest message per stage
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<PipelineStep, String>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignProgress {
    /// All stages pending
    pub fn new(campaign_id: impl Into<CampaignId>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            stages: PipelineStep::ORDER
                .iter()
                .map(|s| (*s, StageStatus::Pending))
                .collect(),
            messages: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn status(&self, stage: PipelineStep) -> StageStatus {
        self.stages
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }

    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.stages.insert(update.stage, update.status);
        match &update.message {
            Some(message) => {
                self.messages.insert(update.stage, message.clone());
            }
            None => {
                self.messages.remove(&update.stage);
            }
        }
        self.updated_at = update.at;
    }

    /// Whether every stage has reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.stages.values().all(StageStatus::is_terminal)
    }
}

/// Destination for progress updates (database row, event bus, ...)
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: ProgressUpdate) -> CoreResult<()>;
}

/// In-memory progress store
///
/// Keeps the folded progress record and the raw update history per campaign.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    campaigns: RwLock<HashMap<CampaignId, CampaignProgress>>,
    history: RwLock<HashMap<CampaignId, Vec<ProgressUpdate>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress of a campaign, if any update was received
    pub fn snapshot(&self, campaign_id: &str) -> Option<CampaignProgress> {
        self.campaigns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(campaign_id)
            .cloned()
    }

    /// Every update received for a campaign, in arrival order
    pub fn history(&self, campaign_id: &str) -> Vec<ProgressUpdate> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(campaign_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, update: ProgressUpdate) {
        {
            let mut campaigns = self.campaigns.write().unwrap_or_else(PoisonError::into_inner);
            campaigns
                .entry(update.campaign_id.clone())
                .or_insert_with(|| CampaignProgress::new(update.campaign_id.clone()))
                .apply(&update);
        }
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(update.campaign_id.clone())
            .or_default()
            .push(update);
    }
}

#[async_trait]
impl ProgressSink for InMemoryProgressStore {
    async fn publish(&self, update: ProgressUpdate) -> CoreResult<()> {
        self.record(update);
        Ok(())
    }
}
