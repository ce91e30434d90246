//! Single-slot notification state machine
//!
//! Pure and time-free: inputs come in as method calls, side effects go out as
//! [`Effect`]s for the provider task to carry out. Timer and exit animation
//! completions carry the generation they were issued under; completions from
//! an older generation are ignored.

use crate::notification::NotificationOptions;
use rewards_core::CommunityReward;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of rewards waiting behind the visible one
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Provider lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderState {
    /// No session
    Idle,
    /// Listening, nothing on screen
    Subscribed,
    /// Reward committed to the slot, auto-hide timer not armed yet
    NotificationPending,
    /// On screen, auto-hide timer running
    NotificationVisible,
    /// Exit animation in flight
    NotificationHiding,
}

/// What to do with a reward that arrives while the slot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrivalPolicy {
    /// The new reward takes the slot and restarts the timer
    #[default]
    ReplaceInPlace,
    /// The new reward is discarded until the slot is free
    DropWhileBusy,
    /// The new reward waits its turn (bounded FIFO)
    Queue,
}

/// Why a reward was not shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    NoSession,
    SlotBusy,
    QueueFull,
    Replaced,
}

/// Side effects requested by the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Render the reward in the visible slot
    Show(CommunityReward),
    /// Fire [`NotificationMachine::timer_elapsed`] after `after`
    ArmTimer { generation: u64, after: Duration },
    /// Start the exit animation and report it to
    /// [`NotificationMachine::exit_completed`]
    BeginExit { generation: u64, reward: CommunityReward },
    /// The reward left the slot after its exit animation
    Closed(CommunityReward),
    /// The reward will never be shown
    Discarded(CommunityReward, DiscardReason),
    /// Drop any pending timer and exit animation
    Reset,
}

/// Observable slot contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub state: ProviderState,
    pub current_reward: Option<CommunityReward>,
    pub visible: bool,
    pub queued: usize,
}

/// The notification slot and its transitions
#[derive(Debug)]
pub struct NotificationMachine {
    options: NotificationOptions,
    policy: ArrivalPolicy,
    queue_capacity: usize,
    state: ProviderState,
    current: Option<CommunityReward>,
    visible: bool,
    queue: VecDeque<CommunityReward>,
    generation: u64,
}

impl NotificationMachine {
    pub fn new(options: NotificationOptions, policy: ArrivalPolicy, queue_capacity: usize) -> Self {
        Self {
            options,
            policy,
            queue_capacity: queue_capacity.max(1),
            state: ProviderState::Idle,
            current: None,
            visible: false,
            queue: VecDeque::new(),
            generation: 0,
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn current(&self) -> Option<&CommunityReward> {
        self.current.as_ref()
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            state: self.state,
            current_reward: self.current.clone(),
            visible: self.visible,
            queued: self.queue.len(),
        }
    }

    // ─── Session ─────────────────────────────────────────────────

    pub fn session_started(&mut self) {
        if self.state == ProviderState::Idle {
            self.state = ProviderState::Subscribed;
        }
    }

    /// Tear everything down. Nothing is reported closed: there is no UI left.
    pub fn session_ended(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.state = ProviderState::Idle;
        self.visible = false;
        self.current = None;
        self.queue.clear();
        vec![Effect::Reset]
    }

    // ─── Inputs ──────────────────────────────────────────────────

    /// A reward arrived from the channel
    pub fn reward_received(&mut self, reward: CommunityReward) -> Vec<Effect> {
        match self.state {
            ProviderState::Idle => vec![Effect::Discarded(reward, DiscardReason::NoSession)],
            ProviderState::Subscribed => self.present(reward),
            ProviderState::NotificationPending
            | ProviderState::NotificationVisible
            | ProviderState::NotificationHiding => match self.policy {
                ArrivalPolicy::ReplaceInPlace => {
                    let mut effects = Vec::new();
                    if let Some(old) = self.current.take() {
                        effects.push(Effect::Discarded(old, DiscardReason::Replaced));
                    }
                    effects.extend(self.present(reward));
                    effects
                }
                ArrivalPolicy::DropWhileBusy => {
                    vec![Effect::Discarded(reward, DiscardReason::SlotBusy)]
                }
                ArrivalPolicy::Queue => {
                    let mut effects = Vec::new();
                    if self.queue.len() >= self.queue_capacity {
                        if let Some(oldest) = self.queue.pop_front() {
                            effects.push(Effect::Discarded(oldest, DiscardReason::QueueFull));
                        }
                    }
                    self.queue.push_back(reward);
                    effects
                }
            },
        }
    }

    /// The provider rendered the pending reward and armed its timer
    pub fn shown(&mut self) {
        if self.state == ProviderState::NotificationPending {
            self.state = ProviderState::NotificationVisible;
        }
    }

    /// User dismissal. A no-op unless a notification is on screen.
    pub fn dismiss(&mut self) -> Vec<Effect> {
        self.begin_exit()
    }

    pub fn timer_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation {
            return Vec::new();
        }
        self.begin_exit()
    }

    pub fn exit_completed(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.state != ProviderState::NotificationHiding {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(reward) = self.current.take() {
            effects.push(Effect::Closed(reward));
        }
        self.state = ProviderState::Subscribed;

        if let Some(next) = self.queue.pop_front() {
            effects.extend(self.present(next));
        }
        effects
    }

    // ─── Transitions ─────────────────────────────────────────────

    /// Commit the reward and visibility together, then ask for the timer
    fn present(&mut self, reward: CommunityReward) -> Vec<Effect> {
        self.generation += 1;
        self.current = Some(reward.clone());
        self.visible = true;
        self.state = ProviderState::NotificationPending;

        let mut effects = vec![Effect::Show(reward)];
        if self.options.auto_hide {
            effects.push(Effect::ArmTimer {
                generation: self.generation,
                after: self.options.duration,
            });
        }
        effects
    }

    fn begin_exit(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            ProviderState::NotificationPending | ProviderState::NotificationVisible
        ) {
            return Vec::new();
        }
        let Some(reward) = self.current.clone() else {
            return Vec::new();
        };

        self.generation += 1;
        self.visible = false;
        self.state = ProviderState::NotificationHiding;
        vec![Effect::BeginExit {
            generation: self.generation,
            reward,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reward(id: &str) -> CommunityReward {
        CommunityReward::from_payload(&json!({
            "id": id,
            "type": "referral_bonus",
            "points": 50,
            "created_at": "2024-05-01T12:00:00Z"
        }))
        .unwrap()
    }

    fn machine(policy: ArrivalPolicy) -> NotificationMachine {
        let mut m = NotificationMachine::new(NotificationOptions::default(), policy, 2);
        m.session_started();
        m
    }

    fn armed_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::ArmTimer { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("timer armed")
    }

    fn exit_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::BeginExit { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("exit started")
    }

    fn assert_slot_invariant(m: &NotificationMachine) {
        if m.visible() {
            assert!(m.current().is_some(), "visible without a reward");
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut m = machine(ArrivalPolicy::ReplaceInPlace);
        assert_eq!(m.state(), ProviderState::Subscribed);

        let effects = m.reward_received(reward("r1"));
        assert_eq!(effects[0], Effect::Show(reward("r1")));
        assert_eq!(m.state(), ProviderState::NotificationPending);
        assert!(m.visible());
        assert_eq!(m.current().unwrap().id(), "r1");

        m.shown();
        assert_eq!(m.state(), ProviderState::NotificationVisible);

        let effects = m.timer_elapsed(armed_generation(&effects));
        assert_eq!(m.state(), ProviderState::NotificationHiding);
        assert!(!m.visible());
        // Reward stays while the exit animation plays
        assert_eq!(m.current().unwrap().id(), "r1");
        assert_slot_invariant(&m);

        let effects = m.exit_completed(exit_generation(&effects));
        assert_eq!(effects, vec![Effect::Closed(reward("r1"))]);
        assert_eq!(m.state(), ProviderState::Subscribed);
        assert!(m.current().is_none());
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let mut m = machine(ArrivalPolicy::ReplaceInPlace);
        m.reward_received(reward("r1"));
        m.shown();

        let first = m.dismiss();
        assert_eq!(first.len(), 1);
        assert!(m.dismiss().is_empty());

        let closed = m.exit_completed(exit_generation(&first));
        assert_eq!(closed.len(), 1);
        assert!(m.dismiss().is_empty());
        assert!(m.exit_completed(exit_generation(&first)).is_empty());
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut m = machine(ArrivalPolicy::ReplaceInPlace);
        let first = m.reward_received(reward("r1"));
        m.shown();
        let second = m.reward_received(reward("r2"));
        m.shown();

        assert!(m.timer_elapsed(armed_generation(&first)).is_empty());
        assert_eq!(m.state(), ProviderState::NotificationVisible);
        assert_eq!(m.timer_elapsed(armed_generation(&second)).len(), 1);
    }

    #[test]
    fn test_replace_in_place() {
        let mut m = machine(ArrivalPolicy::ReplaceInPlace);
        m.reward_received(reward("r1"));
        m.shown();

        let effects = m.reward_received(reward("r2"));
        assert_eq!(effects[0], Effect::Discarded(reward("r1"), DiscardReason::Replaced));
        assert_eq!(effects[1], Effect::Show(reward("r2")));
        assert!(matches!(effects[2], Effect::ArmTimer { .. }));
        assert_eq!(m.current().unwrap().id(), "r2");
        assert!(m.visible());
    }

    #[test]
    fn test_replace_during_exit_cancels_close() {
        let mut m = machine(ArrivalPolicy::ReplaceInPlace);
        m.reward_received(reward("r1"));
        m.shown();
        let exit = m.dismiss();

        m.reward_received(reward("r2"));
        m.shown();
        assert!(m.exit_completed(exit_generation(&exit)).is_empty());
        assert_eq!(m.current().unwrap().id(), "r2");
        assert!(m.visible());
    }

    #[test]
    fn test_drop_while_busy() {
        let mut m = machine(ArrivalPolicy::DropWhileBusy);
        m.reward_received(reward("r1"));
        m.shown();
        let effects = m.reward_received(reward("r2"));
        assert_eq!(effects, vec![Effect::Discarded(reward("r2"), DiscardReason::SlotBusy)]);

        // Still busy while the exit animation plays
        let exit = m.dismiss();
        let effects = m.reward_received(reward("r3"));
        assert_eq!(effects, vec![Effect::Discarded(reward("r3"), DiscardReason::SlotBusy)]);

        m.exit_completed(exit_generation(&exit));
        assert!(matches!(m.reward_received(reward("r4"))[0], Effect::Show(_)));
    }

    #[test]
    fn test_queue_shows_next_after_close() {
        let mut m = machine(ArrivalPolicy::Queue);
        m.reward_received(reward("r1"));
        m.shown();
        assert!(m.reward_received(reward("r2")).is_empty());
        assert!(m.reward_received(reward("r3")).is_empty());

        // Capacity 2: the oldest waiting reward is dropped
        let effects = m.reward_received(reward("r4"));
        assert_eq!(effects, vec![Effect::Discarded(reward("r2"), DiscardReason::QueueFull)]);
        assert_eq!(m.snapshot().queued, 2);

        let exit = m.dismiss();
        let effects = m.exit_completed(exit_generation(&exit));
        assert_eq!(effects[0], Effect::Closed(reward("r1")));
        assert_eq!(effects[1], Effect::Show(reward("r3")));
        assert_eq!(m.state(), ProviderState::NotificationPending);
        assert!(m.visible());
    }

    #[test]
    fn test_no_auto_hide_arms_no_timer() {
        let options = NotificationOptions {
            auto_hide: false,
            ..Default::default()
        };
        let mut m = NotificationMachine::new(options, ArrivalPolicy::ReplaceInPlace, 1);
        m.session_started();
        let effects = m.reward_received(reward("r1"));
        assert_eq!(effects, vec![Effect::Show(reward("r1"))]);
    }

    #[test]
    fn test_session_end_clears_without_close() {
        let mut m = machine(ArrivalPolicy::Queue);
        let shown = m.reward_received(reward("r1"));
        m.shown();
        m.reward_received(reward("r2"));

        assert_eq!(m.session_ended(), vec![Effect::Reset]);
        assert_eq!(m.state(), ProviderState::Idle);
        assert!(m.current().is_none());
        assert!(!m.visible());
        assert_eq!(m.snapshot().queued, 0);
        assert!(m.timer_elapsed(armed_generation(&shown)).is_empty());

        let effects = m.reward_received(reward("r3"));
        assert_eq!(effects, vec![Effect::Discarded(reward("r3"), DiscardReason::NoSession)]);
    }
}
