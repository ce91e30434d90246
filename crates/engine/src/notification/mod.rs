//! Reward notification presentation contract
//!
//! A [`Presenter`] renders the current reward and plays its exit animation.
//! `hide` returns an [`ExitAnimation`] future that resolves when the
//! animation has finished; the provider clears the reward and reports the
//! close only after that, so the animation always has content to animate.

mod animation;

pub use animation::{AnimationDone, ExitAnimation};

use rewards_core::{CommunityReward, RewardKind};
use std::time::Duration;
use tracing::{debug, info};

/// Default time a notification stays up before hiding itself
pub const DEFAULT_DURATION_MS: u64 = 4000;

/// Default exit animation length for presenters without their own
pub const DEFAULT_EXIT_ANIMATION_MS: u64 = 300;

/// Display options of the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Hide automatically after `duration`
    pub auto_hide: bool,
    pub duration: Duration,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            auto_hide: true,
            duration: Duration::from_millis(DEFAULT_DURATION_MS),
        }
    }
}

/// What is shown for a reward
#[derive(Debug, Clone, PartialEq)]
pub struct RewardNotification {
    reward: CommunityReward,
    kind: RewardKind,
}

impl RewardNotification {
    pub fn new(reward: CommunityReward) -> Self {
        let kind = RewardKind::parse(reward.reward_type());
        Self { reward, kind }
    }

    pub fn reward(&self) -> &CommunityReward {
        &self.reward
    }

    pub fn kind(&self) -> &RewardKind {
        &self.kind
    }

    pub fn icon(&self) -> &'static str {
        self.kind.icon()
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    /// `+N Credits`
    pub fn credits_label(&self) -> String {
        self.reward.credits_earned().label()
    }

    pub fn body(&self) -> &str {
        self.reward.trigger_action()
    }

    /// Single-line form for in-app lists: `🔥 +10 Your post went viral`
    pub fn compact(&self) -> String {
        let line = format!("{} +{}", self.icon(), self.reward.credits_earned());
        if self.body().is_empty() {
            line
        } else {
            format!("{} {}", line, self.body())
        }
    }
}

/// Renders notifications
pub trait Presenter: Send + Sync {
    /// Render `notification` in the visible slot, replacing whatever was there
    fn show(&self, notification: &RewardNotification);

    /// Start the exit animation
    fn hide(&self, notification: &RewardNotification) -> ExitAnimation;

    /// The notification is gone and its data released
    fn closed(&self, _notification: &RewardNotification) {}
}

// ─── Tracing ─────────────────────────────────────────────────────────

/// Presenter that writes notifications to the log
#[derive(Debug, Clone)]
pub struct TracingPresenter {
    exit_animation: Duration,
}

impl TracingPresenter {
    pub fn new(exit_animation: Duration) -> Self {
        Self { exit_animation }
    }
}

impl Default for TracingPresenter {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_EXIT_ANIMATION_MS))
    }
}

impl Presenter for TracingPresenter {
    fn show(&self, notification: &RewardNotification) {
        info!(
            "{} {} {} - {}",
            notification.icon(),
            notification.title(),
            notification.credits_label(),
            notification.body()
        );
    }

    fn hide(&self, notification: &RewardNotification) -> ExitAnimation {
        debug!("Hiding reward {}", notification.reward().id());
        ExitAnimation::timed(self.exit_animation)
    }

    fn closed(&self, notification: &RewardNotification) {
        debug!("Reward {} closed", notification.reward().id());
    }
}
