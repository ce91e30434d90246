//! Reward summary and claim result models

use crate::CommunityReward;
use serde::{Deserialize, Serialize};

/// Aggregated reward totals shown on the rewards screen
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RewardSummary {
    pub total_credits_earned: i64,
    pub total_rewards: u32,
    pub achievements_unlocked: u32,
    pub recent_rewards: Vec<CommunityReward>,
}

/// Response of the `get_user_reward_summary` RPC
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardSummaryResponse {
    #[serde(default)]
    pub credits: Option<CreditTotals>,
    #[serde(default)]
    pub community_points: Option<CommunityPoints>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditTotals {
    #[serde(default)]
    pub lifetime_earned: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityPoints {
    #[serde(default)]
    pub total_rewards: u32,
}

impl From<RewardSummaryResponse> for RewardSummary {
    fn from(resp: RewardSummaryResponse) -> Self {
        Self {
            total_credits_earned: resp
                .credits
                .map(|c| c.lifetime_earned.round() as i64)
                .unwrap_or(0),
            total_rewards: resp.community_points.map(|p| p.total_rewards).unwrap_or(0),
            // Achievements and recent rewards are fetched separately
            achievements_unlocked: 0,
            recent_rewards: Vec::new(),
        }
    }
}

/// Result of a claim RPC (`claim_anniversary_bonus`, `claim_referral_bonus`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_awarded: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_unlocked: Option<bool>,
}

impl RewardResult {
    /// A failed claim carrying the reason
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}
