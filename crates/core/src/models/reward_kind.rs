//! Known reward types and how they are labelled

use serde::{Deserialize, Serialize};

/// Reward type tag as stored in `community_rewards.type`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RewardKind {
    PositiveReview,
    FirstPostBonus,
    FirstLikeBonus,
    EngagementMilestone10,
    EngagementMilestone25,
    EngagementMilestone50,
    ViralPost,
    SuperViralPost,
    HelpfulCommenter,
    ReportValidation,
    CommunityGuardian,
    ReferralBonus,
    AnniversaryBonus,
    /// Any tag this client does not know about
    Other(String),
}

impl RewardKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "positive_review" => Self::PositiveReview,
            "first_post_bonus" => Self::FirstPostBonus,
            "first_like_bonus" => Self::FirstLikeBonus,
            "engagement_milestone_10" => Self::EngagementMilestone10,
            "engagement_milestone_25" => Self::EngagementMilestone25,
            "engagement_milestone_50" => Self::EngagementMilestone50,
            "viral_post" => Self::ViralPost,
            "super_viral_post" => Self::SuperViralPost,
            "helpful_commenter" => Self::HelpfulCommenter,
            "report_validation" => Self::ReportValidation,
            "community_guardian" => Self::CommunityGuardian,
            "referral_bonus" => Self::ReferralBonus,
            "anniversary_bonus" => Self::AnniversaryBonus,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PositiveReview => "positive_review",
            Self::FirstPostBonus => "first_post_bonus",
            Self::FirstLikeBonus => "first_like_bonus",
            Self::EngagementMilestone10 => "engagement_milestone_10",
            Self::EngagementMilestone25 => "engagement_milestone_25",
            Self::EngagementMilestone50 => "engagement_milestone_50",
            Self::ViralPost => "viral_post",
            Self::SuperViralPost => "super_viral_post",
            Self::HelpfulCommenter => "helpful_commenter",
            Self::ReportValidation => "report_validation",
            Self::CommunityGuardian => "community_guardian",
            Self::ReferralBonus => "referral_bonus",
            Self::AnniversaryBonus => "anniversary_bonus",
            Self::Other(tag) => tag,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::PositiveReview => "⭐",
            Self::FirstPostBonus => "📝",
            Self::FirstLikeBonus => "👍",
            Self::EngagementMilestone10 => "📈",
            Self::EngagementMilestone25 => "🚀",
            Self::EngagementMilestone50 => "🔥",
            Self::ViralPost => "🔥",
            Self::SuperViralPost => "💥",
            Self::HelpfulCommenter => "💬",
            Self::ReportValidation => "🛡️",
            Self::CommunityGuardian => "🏆",
            Self::ReferralBonus => "👥",
            Self::AnniversaryBonus => "🎉",
            Self::Other(_) => "🎁",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::PositiveReview => "Positive Review!",
            Self::FirstPostBonus => "First Post Bonus!",
            Self::FirstLikeBonus => "First Like!",
            Self::EngagementMilestone10 => "10 Likes Milestone!",
            Self::EngagementMilestone25 => "25 Likes Milestone!",
            Self::EngagementMilestone50 => "50 Likes Milestone!",
            Self::ViralPost => "Viral Post!",
            Self::SuperViralPost => "Super Viral Post!",
            Self::HelpfulCommenter => "Helpful Commenter!",
            Self::ReportValidation => "Report Validated!",
            Self::CommunityGuardian => "Community Guardian!",
            Self::ReferralBonus => "Referral Bonus!",
            Self::AnniversaryBonus => "Anniversary Bonus!",
            Self::Other(_) => "Reward Earned!",
        }
    }
}

/// Where a reward is earned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Marketplace,
    Community,
    Milestones,
}

/// A reward a user can earn, with its requirement and credit value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableReward {
    #[serde(rename = "type")]
    pub reward_type: String,
    pub name: String,
    pub description: String,
    pub credits: i64,
    pub category: RewardCategory,
    pub icon: String,
    /// Granted by the backend without a claim
    pub automatic: bool,
    #[serde(default)]
    pub one_time: bool,
    #[serde(default)]
    pub achievement: bool,
    #[serde(default)]
    pub yearly: bool,
}

/// The fixed catalog of rewards offered to users
pub fn available_rewards() -> Vec<AvailableReward> {
    let entry = |kind: RewardKind,
                 name: &str,
                 description: &str,
                 credits: i64,
                 category: RewardCategory,
                 automatic: bool| AvailableReward {
        icon: kind.icon().to_string(),
        reward_type: kind.as_str().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        credits,
        category,
        automatic,
        one_time: false,
        achievement: false,
        yearly: false,
    };

    vec![
        entry(
            RewardKind::PositiveReview,
            "Positive Review",
            "Earn 3 credits for each 4-5 star review you receive",
            3,
            RewardCategory::Marketplace,
            true,
        ),
        AvailableReward {
            one_time: true,
            ..entry(
                RewardKind::FirstPostBonus,
                "First Post Bonus",
                "Get 5 credits for creating your first community post",
                5,
                RewardCategory::Community,
                true,
            )
        },
        entry(
            RewardKind::ViralPost,
            "Viral Post",
            "Earn 10 credits when your post gets 50+ likes",
            10,
            RewardCategory::Community,
            true,
        ),
        entry(
            RewardKind::SuperViralPost,
            "Super Viral Post",
            "Earn 15 credits when your post reaches 100+ likes",
            15,
            RewardCategory::Community,
            true,
        ),
        entry(
            RewardKind::ReportValidation,
            "Report Validation",
            "Get 5 credits when your report leads to action",
            5,
            RewardCategory::Community,
            true,
        ),
        AvailableReward {
            achievement: true,
            ..entry(
                RewardKind::CommunityGuardian,
                "Community Guardian",
                "Unlock 10 credits for 5+ validated reports",
                10,
                RewardCategory::Milestones,
                true,
            )
        },
        entry(
            RewardKind::ReferralBonus,
            "Referral Bonus",
            "Earn 20 credits for each successful referral",
            20,
            RewardCategory::Milestones,
            false,
        ),
        AvailableReward {
            yearly: true,
            ..entry(
                RewardKind::AnniversaryBonus,
                "Anniversary Bonus",
                "Claim 25 credits on your account anniversary",
                25,
                RewardCategory::Milestones,
                false,
            )
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_falls_back() {
        let kind = RewardKind::parse("mystery_bonus");
        assert_eq!(kind, RewardKind::Other("mystery_bonus".to_string()));
        assert_eq!(kind.icon(), "🎁");
        assert_eq!(kind.title(), "Reward Earned!");
        assert_eq!(kind.as_str(), "mystery_bonus");
    }

    #[test]
    fn test_catalog_flags() {
        let catalog = available_rewards();
        assert_eq!(catalog.len(), 8);

        let anniversary = catalog
            .iter()
            .find(|r| r.reward_type == "anniversary_bonus")
            .unwrap();
        assert!(anniversary.yearly);
        assert!(!anniversary.automatic);
        assert_eq!(anniversary.credits, 25);

        let first_post = catalog
            .iter()
            .find(|r| r.reward_type == "first_post_bonus")
            .unwrap();
        assert!(first_post.one_time);
    }
}
