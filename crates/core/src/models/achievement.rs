//! Achievement progress models for the `user_achievements` table

use crate::CommunityReward;
use serde::{Deserialize, Serialize};

/// A row from `user_achievements`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub id: String,
    pub user_id: String,
    pub achievement_type: String,
    pub achievement_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credits_rewarded: i64,
    #[serde(default)]
    pub progress_current: u32,
    #[serde(default = "default_required")]
    pub progress_required: u32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub unlocked_at: Option<String>,
    pub created_at: String,
}

fn default_required() -> u32 {
    1
}

/// Progress towards a single achievement type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub current: u32,
    pub required: u32,
    /// 0..=100
    pub percentage: f64,
    pub is_completed: bool,
}

impl ProgressInfo {
    /// Progress for an achievement type.
    ///
    /// An achievement record wins. Without one, having earned a reward of that
    /// type counts as complete; otherwise nothing has been made yet.
    pub fn compute(
        achievement_type: &str,
        achievements: &[UserAchievement],
        recent_rewards: &[CommunityReward],
    ) -> Self {
        if let Some(a) = achievements
            .iter()
            .find(|a| a.achievement_type == achievement_type)
        {
            let percentage = if a.progress_required == 0 {
                100.0
            } else {
                (a.progress_current as f64 / a.progress_required as f64 * 100.0).min(100.0)
            };
            return Self {
                current: a.progress_current,
                required: a.progress_required,
                percentage,
                is_completed: a.is_completed,
            };
        }

        if recent_rewards
            .iter()
            .any(|r| r.reward_type() == achievement_type)
        {
            return Self {
                current: 1,
                required: 1,
                percentage: 100.0,
                is_completed: true,
            };
        }

        Self {
            current: 0,
            required: 1,
            percentage: 0.0,
            is_completed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn achievement(kind: &str, current: u32, required: u32) -> UserAchievement {
        UserAchievement {
            id: "a1".to_string(),
            user_id: "u1".to_string(),
            achievement_type: kind.to_string(),
            achievement_name: "Guardian".to_string(),
            description: None,
            credits_rewarded: 10,
            progress_current: current,
            progress_required: required,
            is_completed: current >= required,
            unlocked_at: None,
            created_at: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_progress_from_achievement_is_capped() {
        let achievements = vec![achievement("community_guardian", 7, 5)];
        let progress = ProgressInfo::compute("community_guardian", &achievements, &[]);
        assert_eq!(progress.current, 7);
        assert_eq!(progress.percentage, 100.0);
        assert!(progress.is_completed);

        let achievements = vec![achievement("community_guardian", 2, 5)];
        let progress = ProgressInfo::compute("community_guardian", &achievements, &[]);
        assert_eq!(progress.percentage, 40.0);
        assert!(!progress.is_completed);
    }

    #[test]
    fn test_progress_from_earned_reward() {
        let reward = CommunityReward::from_payload(&json!({
            "id": "r1", "type": "viral_post", "points": 10
        }))
        .unwrap();

        let progress = ProgressInfo::compute("viral_post", &[], &[reward]);
        assert!(progress.is_completed);
        assert_eq!(progress.percentage, 100.0);

        let progress = ProgressInfo::compute("super_viral_post", &[], &[]);
        assert_eq!(progress.current, 0);
        assert_eq!(progress.required, 1);
        assert!(!progress.is_completed);
    }
}
