//! Rewards Engine - Reward store, notification provider, and presentation contract

pub mod notification;
pub mod provider;
pub mod store;

pub use notification::{ExitAnimation, NotificationOptions, Presenter, RewardNotification};
pub use provider::{ArrivalPolicy, NotificationSnapshot, ProviderConfig, ProviderState, RewardsProvider};
pub use store::{RewardChannel, RewardStore, RewardsBackend, Subscription};
