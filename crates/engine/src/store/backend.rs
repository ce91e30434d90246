//! Backend operations the reward store reads and claims through

use async_trait::async_trait;
use rewards_core::{
    CommunityReward, Result, RewardResult, RewardSummary, Session, UserAchievement,
};
use rewards_networking::{api, SupabaseClient};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Durable reward data lives server-side; the store only caches it.
///
/// Every call is made as `session`, using its access token when it has one.
#[async_trait]
pub trait RewardsBackend: Send + Sync {
    async fn reward_summary(&self, session: &Session) -> Result<RewardSummary>;

    async fn recent_rewards(&self, session: &Session) -> Result<Vec<CommunityReward>>;

    async fn achievements(&self, session: &Session) -> Result<Vec<UserAchievement>>;

    async fn claim_anniversary_bonus(&self, session: &Session) -> Result<RewardResult>;

    async fn claim_referral_bonus(
        &self,
        session: &Session,
        referee_id: &str,
        referral_code: Option<&str>,
    ) -> Result<RewardResult>;
}

#[async_trait]
impl RewardsBackend for SupabaseClient {
    async fn reward_summary(&self, session: &Session) -> Result<RewardSummary> {
        api::fetch_reward_summary(&self.for_session(session), &session.user_id).await
    }

    async fn recent_rewards(&self, session: &Session) -> Result<Vec<CommunityReward>> {
        api::fetch_recent_rewards(&self.for_session(session), &session.user_id).await
    }

    async fn achievements(&self, session: &Session) -> Result<Vec<UserAchievement>> {
        api::fetch_achievements(&self.for_session(session), &session.user_id).await
    }

    async fn claim_anniversary_bonus(&self, session: &Session) -> Result<RewardResult> {
        api::claim_anniversary_bonus(&self.for_session(session), &session.user_id).await
    }

    async fn claim_referral_bonus(
        &self,
        session: &Session,
        referee_id: &str,
        referral_code: Option<&str>,
    ) -> Result<RewardResult> {
        let client = self.for_session(session);
        api::claim_referral_bonus(&client, &session.user_id, referee_id, referral_code).await
    }
}

// ─── In-memory ───────────────────────────────────────────────────────

/// Backend holding rewards in memory, for the offline demo and tests
#[derive(Default)]
pub struct MemoryBackend {
    rewards: Mutex<Vec<CommunityReward>>,
    achievements: Mutex<Vec<UserAchievement>>,
    claim_result: Mutex<Option<RewardResult>>,
    summary_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a granted reward, as the server would
    pub fn record(&self, reward: CommunityReward) {
        if let Ok(mut rewards) = self.rewards.lock() {
            rewards.insert(0, reward);
        }
    }

    pub fn set_achievements(&self, achievements: Vec<UserAchievement>) {
        if let Ok(mut slot) = self.achievements.lock() {
            *slot = achievements;
        }
    }

    /// Result returned by both claim operations
    pub fn set_claim_result(&self, result: RewardResult) {
        if let Ok(mut slot) = self.claim_result.lock() {
            *slot = Some(result);
        }
    }

    /// How many summaries have been served
    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    fn user_rewards(&self, user_id: &str) -> Vec<CommunityReward> {
        self.rewards
            .lock()
            .map(|rewards| {
                rewards
                    .iter()
                    .filter(|r| r.user_id() == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn claim(&self) -> RewardResult {
        self.claim_result
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| RewardResult::failed("claims are not available offline"))
    }
}

#[async_trait]
impl RewardsBackend for MemoryBackend {
    async fn reward_summary(&self, session: &Session) -> Result<RewardSummary> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let rewards = self.user_rewards(&session.user_id);
        Ok(RewardSummary {
            total_credits_earned: rewards.iter().map(|r| r.credits_earned().as_i64()).sum(),
            total_rewards: rewards.len() as u32,
            achievements_unlocked: 0,
            recent_rewards: Vec::new(),
        })
    }

    async fn recent_rewards(&self, session: &Session) -> Result<Vec<CommunityReward>> {
        Ok(self
            .user_rewards(&session.user_id)
            .into_iter()
            .take(api::RECENT_REWARDS_LIMIT)
            .collect())
    }

    async fn achievements(&self, session: &Session) -> Result<Vec<UserAchievement>> {
        Ok(self
            .achievements
            .lock()
            .map(|a| {
                a.iter()
                    .filter(|a| a.user_id == session.user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn claim_anniversary_bonus(&self, _session: &Session) -> Result<RewardResult> {
        Ok(self.claim())
    }

    async fn claim_referral_bonus(
        &self,
        _session: &Session,
        _referee_id: &str,
        _referral_code: Option<&str>,
    ) -> Result<RewardResult> {
        Ok(self.claim())
    }
}
