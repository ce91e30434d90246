//! Realtime websocket subscription to database row changes
//!
//! Opens one websocket per subscription, joins a Phoenix channel configured
//! for `postgres_changes`, keeps it alive with heartbeats, and hands every
//! inserted record to a callback. Connection failures are logged and end the
//! subscription quietly: no callback is ever made and nothing is retried.

mod protocol;

pub use protocol::{ChangeFilter, Inbound, PhoenixMessage};

use crate::http::BackendConfig;
use futures_util::{SinkExt, StreamExt};
use rewards_core::{Error, Result, Session};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Interval between keep-alive heartbeats
const HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// Give up connecting after this long
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Callback receiving each new record
pub type RecordCallback = Arc<dyn Fn(Value) + Send + Sync>;

// ─── Client ──────────────────────────────────────────────────────────

/// Factory for realtime channel subscriptions
#[derive(Clone)]
pub struct RealtimeClient {
    url: Url,
    access_token: Option<String>,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
}

impl RealtimeClient {
    /// Create a client for the backend's realtime endpoint
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self::with_url(config.realtime_url()?))
    }

    /// Create a client for an explicit websocket URL
    pub fn with_url(url: Url) -> Self {
        Self {
            url,
            access_token: None,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }

    /// Send the user JWT when joining so row-level security applies
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Client joining as `session`. A session without a token keeps this
    /// client's token.
    pub fn for_session(&self, session: &Session) -> Self {
        match &session.access_token {
            Some(token) => self.clone().with_access_token(token.clone()),
            None => self.clone(),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Subscribe to changes matching `filter` on channel `name`.
    ///
    /// Returns immediately; the connection is made in the background. Must be
    /// called from within a tokio runtime.
    pub fn subscribe(
        &self,
        name: &str,
        filter: ChangeFilter,
        on_record: RecordCallback,
    ) -> RealtimeSubscription {
        let cancel = CancellationToken::new();
        let topic = format!("realtime:{}", name);

        let channel = Channel {
            url: self.url.clone(),
            topic,
            filter,
            access_token: self.access_token.clone(),
            heartbeat_interval: self.heartbeat_interval,
            connect_timeout: self.connect_timeout,
        };

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = channel.run(token, on_record).await {
                warn!("{}", e);
            }
        });

        RealtimeSubscription {
            cancel,
            task: Some(task),
        }
    }
}

// ─── Subscription ────────────────────────────────────────────────────

/// Handle to a live channel. Dropping it leaves the channel.
pub struct RealtimeSubscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Leave the channel and close the socket. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Realtime subscription cancelled");
        }
        self.cancel.cancel();
    }

    /// Whether the background connection has finished
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Unsubscribe and wait for the socket to be closed
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Connection ──────────────────────────────────────────────────────

struct Channel {
    url: Url,
    topic: String,
    filter: ChangeFilter,
    access_token: Option<String>,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
}

impl Channel {
    /// Run until cancelled. Returns an error when the connection could not be
    /// made or was lost; nothing is retried.
    async fn run(self, cancel: CancellationToken, on_record: RecordCallback) -> Result<()> {
        let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));

        let ws = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = connect => match result {
                Ok(Ok((ws, _response))) => ws,
                Ok(Err(e)) => return Err(self.failure(format!("connect failed: {}", e))),
                Err(_) => return Err(self.failure("connect timed out")),
            }
        };

        let (mut sink, mut stream) = ws.split();
        let mut refs = RefCounter::default();
        let join_ref = refs.next();

        let join = PhoenixMessage::join(
            &self.topic,
            &self.filter,
            self.access_token.as_deref(),
            &join_ref,
        );
        sink.send(encode(&join))
            .await
            .map_err(|e| self.failure(format!("join failed: {}", e)))?;

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let leave = PhoenixMessage::leave(&self.topic, &refs.next(), &join_ref);
                    let _ = sink.send(encode(&leave)).await;
                    let _ = sink.close().await;
                    info!("Left realtime channel {}", self.topic);
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage::heartbeat(&refs.next());
                    sink.send(encode(&beat))
                        .await
                        .map_err(|e| self.failure(format!("heartbeat failed: {}", e)))?;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(self.failure("socket closed by server"));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(self.failure(format!("socket error: {}", e))),
                    };

                    let msg: PhoenixMessage = match serde_json::from_str(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            debug!("Ignoring undecodable realtime frame: {}", e);
                            continue;
                        }
                    };

                    match Inbound::classify(msg, &self.topic) {
                        Inbound::Reply { reference, ok, response } => {
                            if reference.as_deref() == Some(join_ref.as_str()) {
                                if !ok {
                                    return Err(self.failure(format!("join rejected: {}", response)));
                                }
                                info!("Joined realtime channel {}", self.topic);
                            }
                        }
                        Inbound::Change(record) => on_record(record),
                        Inbound::ChannelClosed(event) => {
                            return Err(self.failure(format!("channel ended with {}", event)));
                        }
                        Inbound::Ignored => {}
                    }
                }
            }
        }
    }

    fn failure(&self, reason: impl std::fmt::Display) -> Error {
        Error::RealtimeError(format!("{}: {}", self.topic, reason))
    }
}

fn encode(msg: &PhoenixMessage) -> Message {
    // PhoenixMessage holds only strings and JSON values
    Message::Text(serde_json::to_string(msg).unwrap_or_default())
}

/// Monotonic message references, as strings
#[derive(Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    async fn local_server() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("ws://{}/realtime/v1/websocket", addr)).unwrap();
        (listener, url)
    }

    fn collector() -> (RecordCallback, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: RecordCallback = Arc::new(move |record| {
            let _ = tx.send(record);
        });
        (callback, rx)
    }

    #[tokio::test]
    async fn test_join_receive_and_leave() {
        let (listener, url) = local_server().await;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PhoenixMessage>();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let join = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => serde_json::from_str::<PhoenixMessage>(&text).unwrap(),
                other => panic!("unexpected frame {:?}", other),
            };
            let topic = join.topic.clone();
            events_tx.send(join.clone()).unwrap();

            let reply = json!({
                "topic": topic, "event": "phx_reply", "ref": join.reference,
                "payload": { "status": "ok", "response": {} }
            });
            ws.send(Message::Text(reply.to_string())).await.unwrap();

            let change = json!({
                "topic": topic, "event": "postgres_changes", "ref": null,
                "payload": { "data": { "type": "INSERT", "record": { "id": "r1", "points": 50 } } }
            });
            ws.send(Message::Text(change.to_string())).await.unwrap();

            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    let msg: PhoenixMessage = serde_json::from_str(&text).unwrap();
                    let leaving = msg.event == "phx_leave";
                    events_tx.send(msg).unwrap();
                    if leaving {
                        break;
                    }
                }
            }
        });

        let (callback, mut records) = collector();
        let client = RealtimeClient::with_url(url).with_access_token("jwt");
        let filter = ChangeFilter::inserts("public", "community_rewards").where_eq("user_id", "u1");
        let sub = client.subscribe("user_rewards_changes", filter, callback);

        let join = events_rx.recv().await.unwrap();
        assert_eq!(join.topic, "realtime:user_rewards_changes");
        assert_eq!(join.payload["access_token"], "jwt");

        let record = records.recv().await.unwrap();
        assert_eq!(record["id"], "r1");

        sub.unsubscribe();
        sub.unsubscribe();
        let leave = events_rx.recv().await.unwrap();
        assert_eq!(leave.event, "phx_leave");
        assert_eq!(leave.join_ref.as_deref(), Some("1"));

        sub.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_silent() {
        let (listener, url) = local_server().await;
        drop(listener);

        let (callback, mut records) = collector();
        let client = RealtimeClient::with_url(url);
        let sub = client.subscribe(
            "user_rewards_changes",
            ChangeFilter::inserts("public", "community_rewards"),
            callback,
        );

        sub.close().await;
        assert!(records.try_recv().is_err());
    }

    fn channel(url: Url) -> Channel {
        Channel {
            url,
            topic: "realtime:user_rewards_changes".to_string(),
            filter: ChangeFilter::inserts("public", "community_rewards"),
            access_token: None,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_realtime_error() {
        let (listener, url) = local_server().await;
        drop(listener);

        let (callback, _) = collector();
        let err = channel(url)
            .run(CancellationToken::new(), callback)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RealtimeError(_)));
        assert!(err.to_string().contains("realtime:user_rewards_changes"));
    }

    #[tokio::test]
    async fn test_rejected_join_is_realtime_error() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let join = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => serde_json::from_str::<PhoenixMessage>(&text).unwrap(),
                other => panic!("unexpected frame {:?}", other),
            };
            let reply = json!({
                "topic": join.topic, "event": "phx_reply", "ref": join.reference,
                "payload": { "status": "error", "response": { "reason": "unauthorized" } }
            });
            ws.send(Message::Text(reply.to_string())).await.unwrap();
            // Keep the socket open until the client gives up
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (callback, _) = collector();
        let err = channel(url)
            .run(CancellationToken::new(), callback)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RealtimeError(ref reason) if reason.contains("join rejected")));
        server.await.unwrap();
    }

    #[test]
    fn test_session_token_replaces_client_token() {
        let url = Url::parse("ws://127.0.0.1:1/realtime/v1/websocket").unwrap();
        let client = RealtimeClient::with_url(url).with_access_token("old");

        let scoped = client.for_session(&Session::new("u2").with_access_token("jwt-u2"));
        assert_eq!(scoped.access_token.as_deref(), Some("jwt-u2"));
        assert_eq!(client.for_session(&Session::new("u2")).access_token.as_deref(), Some("old"));
    }
}
