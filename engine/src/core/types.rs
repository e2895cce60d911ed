//! KitGen Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Campaign identifier (opaque, owned by the dashboard database)
pub type CampaignId = String;

/// Generated asset identifier (ULID)
pub type AssetId = String;

/// Provider identifier, also the circuit-breaker key (e.g., "elevenlabs")
pub type ProviderId = String;

/// Provider-assigned generation job identifier
pub type JobId = String;

// =============================================================================
// Platforms
// =============================================================================

/// Ad placement a video ad is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Tiktok,
    Youtube,
    X,
    Facebook,
    Line,
}

impl Platform {
    /// All platforms in display order
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::X,
        Platform::Facebook,
        Platform::Line,
    ];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::X => "x",
            Platform::Facebook => "facebook",
            Platform::Line => "line",
        }
    }

    /// Preferred aspect ratio for short-form ads on this platform
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            Platform::Instagram | Platform::Tiktok => "9:16",
            Platform::Youtube | Platform::X => "16:9",
            Platform::Facebook | Platform::Line => "1:1",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized || (normalized == "twitter" && *p == Platform::X))
            .ok_or_else(|| {
                format!(
                    "Unknown platform '{}'. Valid: {}",
                    s,
                    Platform::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!("Instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!(" line ".parse::<Platform>().unwrap(), Platform::Line);
        assert_eq!("twitter".parse::<Platform>().unwrap(), Platform::X);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serialization() {
        assert_eq!(
            serde_json::to_string(&Platform::Tiktok).unwrap(),
            "\"tiktok\""
        );
    }

    #[test]
    fn test_platform_aspect_ratio() {
        assert_eq!(Platform::Tiktok.aspect_ratio(), "9:16");
        assert_eq!(Platform::Youtube.aspect_ratio(), "16:9");
        assert_eq!(Platform::Line.aspect_ratio(), "1:1");
    }
}
