//! Application configuration
//!
//! Loaded from an optional JSON file, then overridden by `REWARDS_*`
//! environment variables and finally by command-line flags.

use rewards_core::{Error, Result, Session};
use rewards_engine::provider::{ArrivalPolicy, DEFAULT_QUEUE_CAPACITY};
use rewards_engine::notification::{DEFAULT_DURATION_MS, DEFAULT_EXIT_ANIMATION_MS};
use rewards_engine::{NotificationOptions, ProviderConfig};
use rewards_networking::BackendConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_SUPABASE_URL: &str = "REWARDS_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "REWARDS_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "REWARDS_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "REWARDS_USER_ID";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub supabase_url: Option<String>,
    pub anon_key: Option<String>,
    /// User JWT; when set without `user_id` the user is looked up from it
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfig {
    pub auto_hide: bool,
    pub duration_ms: u64,
    pub exit_animation_ms: u64,
    pub arrival_policy: ArrivalPolicy,
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            auto_hide: true,
            duration_ms: DEFAULT_DURATION_MS,
            exit_animation_ms: DEFAULT_EXIT_ANIMATION_MS,
            arrival_policy: ArrivalPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read `path`, or start from defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigError(format!("invalid {}: {}", path.display(), e)))
    }

    /// Apply `REWARDS_*` variables from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = get(ENV_ANON_KEY) {
            self.anon_key = Some(key);
        }
        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(user) = get(ENV_USER_ID) {
            self.user_id = Some(user);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = &self.notification;
        if n.auto_hide && n.duration_ms == 0 {
            return Err(Error::ConfigError(
                "durationMs must be positive when autoHide is on".to_string(),
            ));
        }
        if n.arrival_policy == ArrivalPolicy::Queue && n.queue_capacity == 0 {
            return Err(Error::ConfigError(
                "queueCapacity must be positive for the queue policy".to_string(),
            ));
        }
        Ok(())
    }

    /// Backend settings, required for the realtime listener
    pub fn backend(&self) -> Result<BackendConfig> {
        let url = non_empty(&self.supabase_url)
            .ok_or_else(|| missing("supabaseUrl", ENV_SUPABASE_URL))?;
        let anon_key =
            non_empty(&self.anon_key).ok_or_else(|| missing("anonKey", ENV_ANON_KEY))?;
        Ok(BackendConfig::new(url, anon_key))
    }

    /// Session for the configured user, if one is set
    pub fn session(&self) -> Option<Session> {
        let user_id = non_empty(&self.user_id)?;
        let session = Session::new(user_id);
        Some(match non_empty(&self.access_token) {
            Some(token) => session.with_access_token(token),
            None => session,
        })
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let n = &self.notification;
        ProviderConfig {
            notification: NotificationOptions {
                auto_hide: n.auto_hide,
                duration: Duration::from_millis(n.duration_ms),
            },
            arrival_policy: n.arrival_policy,
            queue_capacity: n.queue_capacity,
        }
    }

    pub fn exit_animation(&self) -> Duration {
        Duration::from_millis(self.notification.exit_animation_ms)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn missing(field: &str, env: &str) -> Error {
    Error::ConfigError(format!("{} is not set (config file or {})", field, env))
}
