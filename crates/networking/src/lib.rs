//! Rewards Networking - Supabase REST client, realtime channel, and API wrappers

pub mod api;
pub mod http;
pub mod realtime;

pub use http::{BackendConfig, SupabaseClient};
pub use realtime::{RealtimeClient, RealtimeSubscription};
