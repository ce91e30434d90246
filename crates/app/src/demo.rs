//! Offline demo: the full pipeline over an in-process channel

use crate::config::AppConfig;
use chrono::Utc;
use rewards_core::{CommunityReward, Session};
use rewards_engine::notification::TracingPresenter;
use rewards_engine::store::{LocalRewardChannel, MemoryBackend};
use rewards_engine::{RewardStore, RewardsProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

const DEMO_USER: &str = "demo-user";

const SAMPLES: &[(&str, i64, &str)] = &[
    ("helpful_commenter", 5, "Your comment was marked helpful"),
    ("viral_post", 10, "Your post reached 100 likes"),
    ("positive_review", 3, "Someone found your review useful"),
    ("first_post_bonus", 20, "Welcome to the community!"),
    ("referral_bonus", 50, "A friend joined with your code"),
    ("engagement_milestone_10", 15, "Ten posts and counting"),
];

fn sample_payload(index: usize) -> Value {
    let (kind, points, action) = SAMPLES[index % SAMPLES.len()];
    json!({
        "id": format!("demo-{}", index + 1),
        "user_id": DEMO_USER,
        "type": kind,
        "points": points,
        "description": action,
        "is_validated": true,
        "created_at": Utc::now().to_rfc3339(),
    })
}

pub async fn run(config: AppConfig, count: usize, interval_ms: u64) -> anyhow::Result<()> {
    let channel = LocalRewardChannel::new();
    let backend = Arc::new(MemoryBackend::new());
    let store = RewardStore::new(Arc::new(channel.clone()), backend.clone());

    let presenter = Arc::new(TracingPresenter::new(config.exit_animation()));
    let provider = RewardsProvider::spawn(store.clone(), presenter, config.provider_config());
    provider.start(Session::new(DEMO_USER)).await;

    info!("Publishing {} sample rewards", count);
    for index in 0..count {
        let payload = sample_payload(index);
        match CommunityReward::from_payload(&payload) {
            Ok(reward) => backend.record(reward),
            Err(e) => warn!("Bad sample reward: {}", e),
        }
        channel.publish(DEMO_USER, payload);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let mut slot = provider.watch();
    tokio::select! {
        _ = slot.wait_for(|s| s.current_reward.is_none() && s.queued == 0) => {}
        _ = signal::ctrl_c() => info!("Interrupted"),
    }

    store.refresh(&Session::new(DEMO_USER)).await;
    if let Some(summary) = store.snapshot().await.reward_summary {
        info!(
            "Demo done: {} credits from {} rewards",
            summary.total_credits_earned, summary.total_rewards
        );
    }

    provider.stop().await;
    provider.shutdown();
    Ok(())
}
