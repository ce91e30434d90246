//! Reward store: cached reward state plus the real-time subscription
//!
//! The store wraps an injected [`RewardChannel`] and [`RewardsBackend`].
//! `subscribe_to_rewards` decodes and validates each pushed payload before
//! handing it to the caller, then refreshes the cached summary and recent
//! rewards in the background. Refreshes requested while one is running are
//! merged into a single follow-up. Failures are recorded in `error` and
//! logged, never propagated to the subscriber.

mod backend;
mod channel;

pub use backend::{MemoryBackend, RewardsBackend};
pub use channel::{LocalRewardChannel, PayloadSink, RewardChannel, Subscription};

use rewards_core::{
    available_rewards, AvailableReward, CommunityReward, Error, ProgressInfo, Result,
    RewardResult, RewardSummary, Session, UserAchievement,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Callback receiving validated rewards
pub type RewardCallback = Arc<dyn Fn(CommunityReward) + Send + Sync>;

/// Snapshot of everything the store has cached
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub reward_summary: Option<RewardSummary>,
    pub recent_rewards: Vec<CommunityReward>,
    pub achievements: Vec<UserAchievement>,
    pub available_rewards: Vec<AvailableReward>,
    pub loading: bool,
    pub error: Option<String>,
}

/// At most one background refresh runs; later requests keep only the newest
#[derive(Default)]
struct RefreshQueue {
    pending: Mutex<Option<Session>>,
    running: AtomicBool,
}

impl RefreshQueue {
    fn request(&self, session: Session) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(session);
        }
    }

    fn take(&self) -> Option<Session> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }

    fn has_pending(&self) -> bool {
        self.pending.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Claim the worker slot; false if a worker is already running
    fn try_start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Shared reward store
#[derive(Clone)]
pub struct RewardStore {
    channel: Arc<dyn RewardChannel>,
    backend: Arc<dyn RewardsBackend>,
    state: Arc<RwLock<StoreState>>,
    refresh_queue: Arc<RefreshQueue>,
}

impl RewardStore {
    pub fn new(channel: Arc<dyn RewardChannel>, backend: Arc<dyn RewardsBackend>) -> Self {
        Self {
            channel,
            backend,
            state: Arc::new(RwLock::new(StoreState::default())),
            refresh_queue: Arc::new(RefreshQueue::default()),
        }
    }

    // ─── Subscription ────────────────────────────────────────────

    /// Listen for new rewards granted to the session's user.
    ///
    /// Malformed payloads are dropped. A session without a user id yields a
    /// subscription that does nothing.
    pub fn subscribe_to_rewards(&self, session: &Session, callback: RewardCallback) -> Subscription {
        if session.user_id.is_empty() {
            debug!("No user id, skipping reward subscription");
            return Subscription::noop();
        }

        let store = self.clone();
        let owner = session.clone();
        let sink: PayloadSink = Arc::new(move |payload| {
            match CommunityReward::from_payload(&payload) {
                Ok(reward) => {
                    debug!("Reward {} received for {}", reward.id(), owner.user_id);
                    callback(reward);
                    store.spawn_refresh(&owner);
                }
                Err(e) => warn!("Dropping reward payload for {}: {}", owner.user_id, e),
            }
        });

        info!("Subscribing to rewards for {}", session.user_id);
        self.channel.subscribe(session, sink)
    }

    fn spawn_refresh(&self, session: &Session) {
        self.refresh_queue.request(session.clone());
        if !self.refresh_queue.try_start() {
            debug!("Refresh already running, merging request");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, skipping reward refresh");
            self.refresh_queue.finish();
            return;
        };

        let store = self.clone();
        runtime.spawn(async move {
            loop {
                while let Some(session) = store.refresh_queue.take() {
                    store.refresh(&session).await;
                }
                store.refresh_queue.finish();
                // A request may have landed between the last take and finish
                if !store.refresh_queue.has_pending() || !store.refresh_queue.try_start() {
                    break;
                }
            }
        });
    }

    /// Reload summary and recent rewards, logging failures
    pub async fn refresh(&self, session: &Session) {
        if let Err(e) = self.fetch_reward_summary(session).await {
            debug!("Summary refresh failed: {}", e);
        }
        if let Err(e) = self.fetch_recent_rewards(session).await {
            debug!("Recent rewards refresh failed: {}", e);
        }
    }

    // ─── Fetching ────────────────────────────────────────────────

    pub async fn fetch_reward_summary(&self, session: &Session) -> Result<()> {
        let session = require_user(session)?;
        self.begin_loading().await;

        let result = self.backend.reward_summary(session).await;
        self.finish(result, "reward summary", |state, summary| {
            state.reward_summary = Some(summary)
        })
        .await
    }

    pub async fn fetch_recent_rewards(&self, session: &Session) -> Result<()> {
        let session = require_user(session)?;
        self.begin_loading().await;

        let result = self.backend.recent_rewards(session).await;
        self.finish(result, "recent rewards", |state, rewards| {
            state.recent_rewards = rewards
        })
        .await
    }

    pub async fn fetch_achievements(&self, session: &Session) -> Result<()> {
        let session = require_user(session)?;
        self.begin_loading().await;

        let result = self.backend.achievements(session).await;
        self.finish(result, "achievements", |state, achievements| {
            state.achievements = achievements
        })
        .await
    }

    /// Load the fixed catalog of earnable rewards
    pub async fn fetch_available_rewards(&self) {
        self.state.write().await.available_rewards = available_rewards();
    }

    async fn begin_loading(&self) {
        let mut state = self.state.write().await;
        state.loading = true;
        state.error = None;
    }

    async fn finish<T>(
        &self,
        result: Result<T>,
        what: &str,
        apply: impl FnOnce(&mut StoreState, T),
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(value) => {
                apply(&mut *state, value);
                Ok(())
            }
            Err(e) => {
                error!("Error fetching {}: {}", what, e);
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // ─── Claims ──────────────────────────────────────────────────

    /// Claim the yearly anniversary bonus. Failures come back as an
    /// unsuccessful result, not an error.
    pub async fn claim_anniversary_bonus(&self, session: &Session) -> RewardResult {
        let outcome = match require_user(session) {
            Ok(session) => self.backend.claim_anniversary_bonus(session).await,
            Err(e) => Err(e),
        };
        self.settle_claim(session, outcome, "anniversary bonus").await
    }

    /// Claim the bonus for referring `referee_id`
    pub async fn claim_referral_bonus(
        &self,
        session: &Session,
        referee_id: &str,
        referral_code: Option<&str>,
    ) -> RewardResult {
        let outcome = match require_user(session) {
            Ok(session) => {
                self.backend
                    .claim_referral_bonus(session, referee_id, referral_code)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle_claim(session, outcome, "referral bonus").await
    }

    async fn settle_claim(
        &self,
        session: &Session,
        outcome: Result<RewardResult>,
        what: &str,
    ) -> RewardResult {
        match outcome {
            Ok(result) => {
                if result.success {
                    info!("Claimed {} for {}", what, session.user_id);
                    self.refresh(session).await;
                }
                result
            }
            Err(e) => {
                error!("Error claiming {}: {}", what, e);
                RewardResult::failed(e.to_string())
            }
        }
    }

    // ─── Reading ─────────────────────────────────────────────────

    /// Progress towards an achievement type from cached data
    pub async fn get_reward_progress(&self, achievement_type: &str) -> ProgressInfo {
        let state = self.state.read().await;
        ProgressInfo::compute(achievement_type, &state.achievements, &state.recent_rewards)
    }

    pub async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn set_error(&self, error: Option<String>) {
        self.state.write().await.error = error;
    }

    /// Forget all cached data (e.g. on sign-out)
    pub async fn reset(&self) {
        *self.state.write().await = StoreState::default();
    }
}

fn require_user(session: &Session) -> Result<&Session> {
    if session.user_id.is_empty() {
        Err(Error::NotAuthenticated)
    } else {
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn reward(id: &str, user: &str, kind: &str, points: i64) -> CommunityReward {
        CommunityReward::from_payload(&json!({
            "id": id, "user_id": user, "type": kind, "points": points,
            "description": "test", "is_validated": true
        }))
        .unwrap()
    }

    fn user(id: &str) -> Session {
        Session::new(id)
    }

    fn store_with(backend: Arc<MemoryBackend>) -> (RewardStore, LocalRewardChannel) {
        let channel = LocalRewardChannel::new();
        let store = RewardStore::new(Arc::new(channel.clone()), backend);
        (store, channel)
    }

    fn collecting() -> (RewardCallback, Arc<Mutex<Vec<CommunityReward>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: RewardCallback = Arc::new(move |reward| sink.lock().unwrap().push(reward));
        (callback, seen)
    }

    #[tokio::test]
    async fn test_subscription_validates_payloads() {
        let (store, channel) = store_with(Arc::new(MemoryBackend::new()));
        let (callback, seen) = collecting();
        let _sub = store.subscribe_to_rewards(&user("u1"), callback);

        channel.publish("u1", json!({ "type": "viral_post", "points": 10 }));
        channel.publish("u1", json!({ "id": "r1", "type": "referral_bonus", "points": 50 }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id(), "r1");
    }

    #[tokio::test]
    async fn test_empty_user_subscription_is_noop() {
        let (store, channel) = store_with(Arc::new(MemoryBackend::new()));
        let (callback, _) = collecting();
        let sub = store.subscribe_to_rewards(&user(""), callback);

        assert!(!sub.is_active());
        assert_eq!(channel.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_event_triggers_refresh() {
        let backend = Arc::new(MemoryBackend::new());
        backend.record(reward("r0", "u1", "positive_review", 3));
        let (store, channel) = store_with(backend.clone());
        let (callback, _) = collecting();
        let _sub = store.subscribe_to_rewards(&user("u1"), callback);

        backend.record(reward("r1", "u1", "viral_post", 10));
        channel.publish("u1", json!({ "id": "r1", "user_id": "u1", "type": "viral_post", "points": 10 }));

        for _ in 0..100 {
            if store.snapshot().await.recent_rewards.len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let state = store.snapshot().await;
        assert_eq!(state.recent_rewards.len(), 2);
        assert_eq!(state.recent_rewards[0].id(), "r1");
        let summary = state.reward_summary.unwrap();
        assert_eq!(summary.total_credits_earned, 13);
        assert_eq!(summary.total_rewards, 2);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_fetch_without_user_records_nothing() {
        let (store, _) = store_with(Arc::new(MemoryBackend::new()));
        let err = store.fetch_recent_rewards(&user("")).await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_claim_failure_is_absorbed() {
        let (store, _) = store_with(Arc::new(MemoryBackend::new()));

        let result = store.claim_anniversary_bonus(&user("u1")).await;
        assert!(!result.success);
        assert!(result.error.is_some());

        let result = store.claim_referral_bonus(&user(""), "u2", None).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_successful_claim_refreshes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_claim_result(RewardResult {
            success: true,
            credits_awarded: Some(25),
            ..Default::default()
        });
        backend.record(reward("r9", "u1", "anniversary_bonus", 25));
        let (store, _) = store_with(backend);

        let result = store.claim_anniversary_bonus(&user("u1")).await;
        assert!(result.success);
        assert_eq!(result.credits_awarded, Some(25));

        let state = store.snapshot().await;
        assert_eq!(state.recent_rewards.len(), 1);
        assert_eq!(state.reward_summary.unwrap().total_credits_earned, 25);
    }

    #[tokio::test]
    async fn test_progress_and_reset() {
        let backend = Arc::new(MemoryBackend::new());
        backend.record(reward("r1", "u1", "viral_post", 10));
        let (store, _) = store_with(backend);

        store.fetch_recent_rewards(&user("u1")).await.unwrap();
        store.fetch_available_rewards().await;
        assert!(store.get_reward_progress("viral_post").await.is_completed);
        assert!(!store.get_reward_progress("community_guardian").await.is_completed);
        assert_eq!(store.snapshot().await.available_rewards.len(), 8);

        store.reset().await;
        let state = store.snapshot().await;
        assert!(state.recent_rewards.is_empty());
        assert!(state.available_rewards.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_carries_session_token() {
        let (store, channel) = store_with(Arc::new(MemoryBackend::new()));
        let (callback, _) = collecting();
        let session = Session::new("u2").with_access_token("jwt-u2");
        let _sub = store.subscribe_to_rewards(&session, callback);

        assert_eq!(channel.sessions(), vec![session]);
    }

    #[tokio::test]
    async fn test_burst_of_rewards_refreshes_once() {
        let backend = Arc::new(MemoryBackend::new());
        let (store, channel) = store_with(backend.clone());
        let (callback, seen) = collecting();
        let _sub = store.subscribe_to_rewards(&user("u1"), callback);

        for i in 0..5 {
            let id = format!("r{}", i);
            backend.record(reward(&id, "u1", "viral_post", 10));
            channel.publish("u1", json!({ "id": id, "user_id": "u1", "type": "viral_post", "points": 10 }));
        }
        assert_eq!(seen.lock().unwrap().len(), 5);

        for _ in 0..100 {
            tokio::task::yield_now().await;
        }

        assert_eq!(backend.summary_calls(), 1);
        let state = store.snapshot().await;
        assert_eq!(state.recent_rewards.len(), 5);
        assert_eq!(state.reward_summary.unwrap().total_rewards, 5);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_refresh_after_burst_runs_again() {
        let backend = Arc::new(MemoryBackend::new());
        let (store, channel) = store_with(backend.clone());
        let (callback, _) = collecting();
        let _sub = store.subscribe_to_rewards(&user("u1"), callback);

        channel.publish("u1", json!({ "id": "r1", "user_id": "u1", "type": "viral_post", "points": 10 }));
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        channel.publish("u1", json!({ "id": "r2", "user_id": "u1", "type": "viral_post", "points": 10 }));
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }

        assert_eq!(backend.summary_calls(), 2);
    }
}
