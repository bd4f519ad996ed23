//! Subscription tier types

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Sentinel for "no limit" in page and shot counts
pub const UNLIMITED: i32 = -1;

/// Subscription tier levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free tier - 10 pages, 5 shots per scene, no storyboards
    Free,
    /// Pro tier - unlimited pages and shots, storyboards enabled
    Pro,
}

/// Limits derived from a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    /// Total pages a user may process (`-1` for unlimited)
    pub total_pages: i32,
    /// Shots kept per generated scene (`-1` for unlimited)
    pub max_shots_per_scene: i32,
    /// Whether storyboard generation is available
    pub can_generate_storyboards: bool,
}

impl Tier {
    /// Get the limits granted by this tier
    pub const fn limits(&self) -> TierLimits {
        match self {
            Self::Free => TierLimits {
                total_pages: 10,
                max_shots_per_scene: 5,
                can_generate_storyboards: false,
            },
            Self::Pro => TierLimits {
                total_pages: UNLIMITED,
                max_shots_per_scene: UNLIMITED,
                can_generate_storyboards: true,
            },
        }
    }

    /// Stable lowercase name used in storage and claims
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" | "premium" => Ok(Self::Pro),
            _ => Err(ParseError::InvalidTier(s.to_string())),
        }
    }
}
