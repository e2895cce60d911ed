//! Asset Registry
//!
//! Where produced voiceovers and videos are recorded for a campaign.
//! Registration is an upsert keyed by (campaign, step, platform) so a re-run
//! replaces the previous asset instead of adding a second one.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{AssetRef, MediaKind, MediaPayload, PipelineStep, ProducedMedia};
use crate::core::{CampaignId, CoreError, CoreResult, Platform, ProviderId};

/// Stores produced media and hands back a reference to it
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    async fn register(&self, campaign_id: &str, media: ProducedMedia) -> CoreResult<AssetRef>;
}

/// A registered asset as kept by [`InMemoryAssetRegistry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAsset {
    pub asset: AssetRef,
    pub campaign_id: CampaignId,
    pub step: PipelineStep,
    pub platform: Option<Platform>,
    pub kind: MediaKind,
    pub mime_type: String,
    pub provider: ProviderId,
    /// Inline payload size; `None` for provider-hosted media
    pub size_bytes: Option<usize>,
    pub registered_at: DateTime<Utc>,
}

type AssetKey = (CampaignId, PipelineStep, Option<Platform>);

/// In-memory asset registry
#[derive(Debug, Default)]
pub struct InMemoryAssetRegistry {
    assets: RwLock<HashMap<AssetKey, RegisteredAsset>>,
}

impl InMemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assets registered for a campaign, in step then platform order
    pub fn list(&self, campaign_id: &str) -> Vec<RegisteredAsset> {
        let mut assets: Vec<_> = self
            .assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|a| a.campaign_id == campaign_id)
            .cloned()
            .collect();
        assets.sort_by_key(|a| (a.step, a.platform));
        assets
    }

    pub fn get(
        &self,
        campaign_id: &str,
        step: PipelineStep,
        platform: Option<Platform>,
    ) -> Option<RegisteredAsset> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(campaign_id.to_string(), step, platform))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn location(campaign_id: &str, media: &ProducedMedia) -> String {
        match &media.payload {
            MediaPayload::Url(url) => url.clone(),
            MediaPayload::Bytes(_) => match media.platform {
                Some(platform) => format!("memory://{}/{}/{}", campaign_id, media.step, platform),
                None => format!("memory://{}/{}", campaign_id, media.step),
            },
        }
    }
}

#[async_trait]
impl AssetRegistry for InMemoryAssetRegistry {
    async fn register(&self, campaign_id: &str, media: ProducedMedia) -> CoreResult<AssetRef> {
        if campaign_id.trim().is_empty() {
            return Err(CoreError::RegistrationFailed(
                "Campaign id is empty".to_string(),
            ));
        }

        let url = Self::location(campaign_id, &media);
        let size_bytes = match &media.payload {
            MediaPayload::Bytes(bytes) => Some(bytes.len()),
            MediaPayload::Url(_) => None,
        };
        let key = (campaign_id.to_string(), media.step, media.platform);

        let mut assets = self.assets.write().unwrap_or_else(PoisonError::into_inner);
        // Re-registration keeps the asset id stable.
        let id = assets
            .get(&key)
            .map(|existing| existing.asset.id.clone())
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        let asset = AssetRef::new(id, url);

        assets.insert(
            key,
            RegisteredAsset {
                asset: asset.clone(),
                campaign_id: campaign_id.to_string(),
                step: media.step,
                platform: media.platform,
                kind: media.kind,
                mime_type: media.mime_type,
                provider: media.provider,
                size_bytes,
                registered_at: Utc::now(),
            },
        );

        Ok(asset)
    }
}
