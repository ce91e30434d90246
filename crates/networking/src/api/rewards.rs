//! Reward API operations with validation

use crate::realtime::{ChangeFilter, RealtimeClient, RealtimeSubscription, RecordCallback};
use crate::SupabaseClient;
use rewards_core::{
    CommunityReward, Error, Result, RewardResult, RewardSummary, RewardSummaryResponse,
    UserAchievement,
};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Number of recent rewards kept for display
pub const RECENT_REWARDS_LIMIT: usize = 20;

/// Realtime channel name used for a user's reward inserts
pub const REWARDS_CHANNEL: &str = "user_rewards_changes";

/// Decode reward rows, dropping (and logging) any that fail validation
pub fn decode_rewards(rows: &[Value]) -> Vec<CommunityReward> {
    rows.iter()
        .filter_map(|row| match CommunityReward::from_payload(row) {
            Ok(reward) => Some(reward),
            Err(e) => {
                warn!("Dropping reward row: {}", e);
                None
            }
        })
        .collect()
}

/// Latest validated rewards for a user, newest first
pub async fn fetch_recent_rewards(
    client: &SupabaseClient,
    user_id: &str,
) -> Result<Vec<CommunityReward>> {
    let rows = client
        .select_recent_rewards(user_id, RECENT_REWARDS_LIMIT)
        .await?;
    Ok(decode_rewards(&rows))
}

/// Credit and reward totals from `get_user_reward_summary`
pub async fn fetch_reward_summary(client: &SupabaseClient, user_id: &str) -> Result<RewardSummary> {
    let resp: Option<RewardSummaryResponse> = client
        .rpc("get_user_reward_summary", &json!({ "p_user_id": user_id }))
        .await?;
    Ok(resp.unwrap_or_default().into())
}

/// Achievement records for a user
pub async fn fetch_achievements(
    client: &SupabaseClient,
    user_id: &str,
) -> Result<Vec<UserAchievement>> {
    client.select_achievements(user_id).await
}

/// Claim the yearly account-anniversary bonus
pub async fn claim_anniversary_bonus(client: &SupabaseClient, user_id: &str) -> Result<RewardResult> {
    info!("Claiming anniversary bonus for {}", user_id);
    client
        .rpc("claim_anniversary_bonus", &json!({ "p_user_id": user_id }))
        .await
}

/// Claim the referral bonus for bringing in `referee_id`
pub async fn claim_referral_bonus(
    client: &SupabaseClient,
    referrer_id: &str,
    referee_id: &str,
    referral_code: Option<&str>,
) -> Result<RewardResult> {
    if referee_id.trim().is_empty() {
        return Err(Error::InvalidData("referee id must not be empty".to_string()));
    }
    if referee_id == referrer_id {
        return Err(Error::InvalidData("cannot refer yourself".to_string()));
    }

    info!("Claiming referral bonus for {} -> {}", referrer_id, referee_id);
    client
        .rpc(
            "claim_referral_bonus",
            &json!({
                "p_referrer_id": referrer_id,
                "p_referee_id": referee_id,
                "p_referral_code": referral_code,
            }),
        )
        .await
}

/// Listen for reward rows inserted for `user_id`
pub fn subscribe_user_rewards(
    realtime: &RealtimeClient,
    user_id: &str,
    on_record: RecordCallback,
) -> RealtimeSubscription {
    let filter = ChangeFilter::inserts("public", "community_rewards").where_eq("user_id", user_id);
    realtime.subscribe(REWARDS_CHANNEL, filter, on_record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendConfig;

    #[test]
    fn test_decode_rewards_drops_malformed_rows() {
        let rows = vec![
            json!({ "id": "r1", "type": "viral_post", "points": 10 }),
            json!({ "type": "viral_post", "points": 10 }),
            json!({ "id": "r3" }),
            json!({ "id": "r4", "type": "positive_review", "points": 3 }),
        ];

        let rewards = decode_rewards(&rows);
        let ids: Vec<&str> = rewards.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["r1", "r4"]);
    }

    #[tokio::test]
    async fn test_referral_claim_validates_referee() {
        let client =
            SupabaseClient::new(BackendConfig::new("http://127.0.0.1:9", "k")).unwrap();

        let err = claim_referral_bonus(&client, "u1", " ", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let err = claim_referral_bonus(&client, "u1", "u1", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
