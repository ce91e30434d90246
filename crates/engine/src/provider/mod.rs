//! Rewards provider
//!
//! A background task owning the single notification slot. Session changes,
//! dismissals, pushed rewards, the auto-hide timer and exit animation
//! completion are all serialized through one `select!` loop. The slot is
//! observable through a `watch` channel.

mod machine;

pub use machine::{
    ArrivalPolicy, DiscardReason, NotificationMachine, NotificationSnapshot, ProviderState,
    DEFAULT_QUEUE_CAPACITY,
};

use crate::notification::{ExitAnimation, NotificationOptions, Presenter, RewardNotification};
use crate::store::{RewardCallback, RewardStore, Subscription};
use machine::Effect;
use rewards_core::{CommunityReward, Session};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Provider settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderConfig {
    pub notification: NotificationOptions,
    pub arrival_policy: ArrivalPolicy,
    /// Only used by [`ArrivalPolicy::Queue`]
    pub queue_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            notification: NotificationOptions::default(),
            arrival_policy: ArrivalPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

enum Command {
    Start(Session, oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    Dismiss(oneshot::Sender<()>),
}

/// Handle to the provider task. Cheap to clone; the task stops when
/// [`RewardsProvider::shutdown`] is called or every handle is dropped.
#[derive(Clone)]
pub struct RewardsProvider {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<NotificationSnapshot>,
    cancel_token: CancellationToken,
}

impl RewardsProvider {
    /// Spawn the provider task on the current runtime
    pub fn spawn(store: RewardStore, presenter: Arc<dyn Presenter>, config: ProviderConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (reward_tx, reward_rx) = mpsc::unbounded_channel();
        let machine = NotificationMachine::new(
            config.notification,
            config.arrival_policy,
            config.queue_capacity,
        );
        let (snapshot_tx, snapshot) = watch::channel(machine.snapshot());
        let cancel_token = CancellationToken::new();

        let task = ProviderTask {
            store,
            presenter,
            machine,
            session: None,
            epoch: 0,
            reward_tx,
            timer: None,
            exit: None,
            snapshot: snapshot_tx,
        };
        tokio::spawn(provider_loop(task, command_rx, reward_rx, cancel_token.clone()));

        Self {
            commands,
            snapshot,
            cancel_token,
        }
    }

    /// Begin listening for `session`'s rewards. Starting again with the same
    /// session is a no-op. A new access token for the same user re-joins the
    /// channel and keeps the visible notification; a different user replaces
    /// the previous session.
    pub async fn start(&self, session: Session) {
        self.request(|ack| Command::Start(session, ack)).await
    }

    /// Stop listening and drop whatever is on screen
    pub async fn stop(&self) {
        self.request(Command::Stop).await
    }

    /// Hide the visible notification
    pub async fn dismiss(&self) {
        self.request(Command::Dismiss).await
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the task. Any active session is torn down first.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(command(ack)).is_err() {
            debug!("Rewards provider is not running");
            return;
        }
        let _ = done.await;
    }
}

// ─── Task ────────────────────────────────────────────────────────────

struct ActiveSession {
    session: Session,
    subscription: Subscription,
}

struct PendingExit {
    generation: u64,
    animation: ExitAnimation,
}

struct ProviderTask {
    store: RewardStore,
    presenter: Arc<dyn Presenter>,
    machine: NotificationMachine,
    session: Option<ActiveSession>,
    /// Bumped per session so rewards from an old subscription are ignored
    epoch: u64,
    reward_tx: mpsc::UnboundedSender<(u64, CommunityReward)>,
    timer: Option<(u64, Instant)>,
    exit: Option<PendingExit>,
    snapshot: watch::Sender<NotificationSnapshot>,
}

async fn provider_loop(
    mut task: ProviderTask,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut rewards: mpsc::UnboundedReceiver<(u64, CommunityReward)>,
    cancel_token: CancellationToken,
) {
    debug!("Rewards provider started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                task.stop();
                break;
            }
            command = commands.recv() => match command {
                Some(Command::Start(session, ack)) => {
                    task.start(session);
                    let _ = ack.send(());
                }
                Some(Command::Stop(ack)) => {
                    task.stop();
                    let _ = ack.send(());
                }
                Some(Command::Dismiss(ack)) => {
                    let effects = task.machine.dismiss();
                    task.apply(effects);
                    let _ = ack.send(());
                }
                None => {
                    task.stop();
                    break;
                }
            },
            Some((epoch, reward)) = rewards.recv() => task.reward_received(epoch, reward),
            generation = sleep_until_opt(task.timer) => {
                task.timer = None;
                let effects = task.machine.timer_elapsed(generation);
                task.apply(effects);
            }
            generation = wait_exit(&mut task.exit) => {
                task.exit = None;
                let effects = task.machine.exit_completed(generation);
                task.apply(effects);
            }
        }
    }

    debug!("Rewards provider exited");
}

async fn sleep_until_opt(timer: Option<(u64, Instant)>) -> u64 {
    match timer {
        Some((generation, deadline)) => {
            tokio::time::sleep_until(deadline).await;
            generation
        }
        None => std::future::pending().await,
    }
}

async fn wait_exit(exit: &mut Option<PendingExit>) -> u64 {
    match exit {
        Some(pending) => {
            (&mut pending.animation).await;
            pending.generation
        }
        None => std::future::pending().await,
    }
}

impl ProviderTask {
    fn start(&mut self, session: Session) {
        if session.user_id.is_empty() {
            warn!("Ignoring rewards session without a user id");
            return;
        }
        if let Some(active) = &self.session {
            if active.session == session {
                debug!("Rewards session for {} already active", session.user_id);
                return;
            }
            if active.session.same_identity(&session) {
                self.rejoin(session);
                return;
            }
            self.stop();
        }

        self.epoch += 1;
        let subscription = self.subscribe(&session);
        info!("Rewards provider listening for {}", session.user_id);
        self.session = Some(ActiveSession {
            session,
            subscription,
        });
        self.machine.session_started();
        self.publish();
    }

    /// Swap the subscription for one using the session's new token. Rewards
    /// already delivered under this epoch are still shown.
    fn rejoin(&mut self, session: Session) {
        if let Some(active) = self.session.take() {
            active.subscription.unsubscribe();
        }
        info!("Rewards session for {} refreshed, re-joining", session.user_id);
        let subscription = self.subscribe(&session);
        self.session = Some(ActiveSession {
            session,
            subscription,
        });
    }

    fn subscribe(&self, session: &Session) -> Subscription {
        let epoch = self.epoch;
        let tx = self.reward_tx.clone();
        let callback: RewardCallback = Arc::new(move |reward| {
            let _ = tx.send((epoch, reward));
        });
        self.store.subscribe_to_rewards(session, callback)
    }

    fn stop(&mut self) {
        let Some(active) = self.session.take() else {
            return;
        };
        active.subscription.unsubscribe();
        info!("Rewards provider stopped for {}", active.session.user_id);

        let effects = self.machine.session_ended();
        self.apply(effects);
    }

    fn reward_received(&mut self, epoch: u64, reward: CommunityReward) {
        if self.session.is_none() || epoch != self.epoch {
            debug!("Ignoring reward {} from a closed session", reward.id());
            return;
        }
        let effects = self.machine.reward_received(reward);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Show(reward) => {
                    self.exit = None;
                    self.presenter.show(&RewardNotification::new(reward));
                    self.publish();
                }
                Effect::ArmTimer { generation, after } => {
                    self.timer = Some((generation, Instant::now() + after));
                }
                Effect::BeginExit { generation, reward } => {
                    self.timer = None;
                    let animation = self.presenter.hide(&RewardNotification::new(reward));
                    self.exit = Some(PendingExit {
                        generation,
                        animation,
                    });
                }
                Effect::Closed(reward) => {
                    self.presenter.closed(&RewardNotification::new(reward));
                }
                Effect::Discarded(reward, reason) => {
                    debug!("Reward {} not shown: {:?}", reward.id(), reason);
                }
                Effect::Reset => {
                    self.timer = None;
                    self.exit = None;
                }
            }
        }
        self.machine.shown();
        self.publish();
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
