//! Real-time channel boundary and subscription handles

use rewards_networking::api::subscribe_user_rewards;
use rewards_core::Session;
use rewards_networking::RealtimeClient;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Receives raw reward payloads pushed by a channel
pub type PayloadSink = Arc<dyn Fn(Value) + Send + Sync>;

/// A push channel delivering a user's new reward rows.
///
/// The channel authenticates with the session's access token, so row-level
/// security sees the session's user. Delivery is best-effort: if the channel
/// cannot be established the sink is simply never called.
pub trait RewardChannel: Send + Sync {
    fn subscribe(&self, session: &Session, sink: PayloadSink) -> Subscription;
}

// ─── Subscription ────────────────────────────────────────────────────

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Handle returned by a subscribe call.
///
/// `unsubscribe` detaches the listener; the first call does the work and
/// later calls (including the one made on drop) do nothing.
pub struct Subscription {
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    /// A subscription with nothing to detach
    pub fn noop() -> Self {
        Self {
            unsubscribe: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        let action = match self.unsubscribe.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(action) = action {
            action();
        }
    }

    /// Whether `unsubscribe` still has work to do
    pub fn is_active(&self) -> bool {
        self.unsubscribe
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ─── Realtime ────────────────────────────────────────────────────────

impl RewardChannel for RealtimeClient {
    fn subscribe(&self, session: &Session, sink: PayloadSink) -> Subscription {
        let client = self.for_session(session);
        let realtime = subscribe_user_rewards(&client, &session.user_id, sink);
        Subscription::new(move || realtime.unsubscribe())
    }
}

// ─── In-process ──────────────────────────────────────────────────────

struct Listener {
    user_id: String,
    sink: PayloadSink,
}

#[derive(Default)]
struct LocalInner {
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    sessions: Mutex<Vec<Session>>,
    refuse: AtomicBool,
}

/// In-process reward channel.
///
/// Payloads published for a user are handed synchronously to that user's
/// listeners. Used by the offline demo and by tests, which read the
/// subscribe/unsubscribe counters.
#[derive(Clone, Default)]
pub struct LocalRewardChannel {
    inner: Arc<LocalInner>,
}

impl LocalRewardChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose subscriptions never get established
    pub fn unreachable() -> Self {
        let channel = Self::default();
        channel.inner.refuse.store(true, Ordering::SeqCst);
        channel
    }

    /// Deliver a payload to every listener of `user_id`; returns how many got it
    pub fn publish(&self, user_id: &str, payload: Value) -> usize {
        let sinks: Vec<PayloadSink> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .values()
                .filter(|l| l.user_id == user_id)
                .map(|l| l.sink.clone())
                .collect(),
            Err(_) => return 0,
        };

        for sink in &sinks {
            sink(payload.clone());
        }
        sinks.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// Sessions passed to `subscribe`, oldest first
    pub fn sessions(&self) -> Vec<Session> {
        self.inner
            .sessions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl RewardChannel for LocalRewardChannel {
    fn subscribe(&self, session: &Session, sink: PayloadSink) -> Subscription {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sessions) = self.inner.sessions.lock() {
            sessions.push(session.clone());
        }
        let user_id = session.user_id.as_str();

        let inner = self.inner.clone();
        if self.inner.refuse.load(Ordering::SeqCst) {
            debug!("Local channel refused subscription for {}", user_id);
            return Subscription::new(move || {
                inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(
                id,
                Listener {
                    user_id: user_id.to_string(),
                    sink,
                },
            );
        }

        Subscription::new(move || {
            inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.remove(&id);
            }
        })
    }
}
