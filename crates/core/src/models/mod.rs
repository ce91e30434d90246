//! Data models for reward entities

mod achievement;
mod reward;
mod reward_kind;
mod summary;

pub use achievement::*;
pub use reward::*;
pub use reward_kind::*;
pub use summary::*;
