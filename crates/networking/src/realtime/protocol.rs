//! Phoenix channel frames spoken by the Supabase realtime service

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// One frame on the realtime websocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Which database changes a channel listens to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeFilter {
    /// INSERTs on `schema.table`
    pub fn inserts(schema: &str, table: &str) -> Self {
        Self {
            event: "INSERT".to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    /// Restrict to rows where `column` equals `value`
    pub fn where_eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }
}

impl PhoenixMessage {
    pub fn join(
        topic: &str,
        filter: &ChangeFilter,
        access_token: Option<&str>,
        reference: &str,
    ) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [filter],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: &str, join_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }
}

/// What an inbound frame means for a channel subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a request we sent
    Reply { reference: Option<String>, ok: bool, response: Value },
    /// A row change; carries the new record
    Change(Value),
    /// The server closed or errored the channel
    ChannelClosed(String),
    /// Heartbeat replies, presence, system messages
    Ignored,
}

impl Inbound {
    /// Classify a frame addressed to `topic`
    pub fn classify(msg: PhoenixMessage, topic: &str) -> Self {
        if msg.event == EVENT_REPLY {
            let ok = msg.payload.get("status").and_then(Value::as_str) == Some("ok");
            let response = msg.payload.get("response").cloned().unwrap_or(Value::Null);
            return Inbound::Reply {
                reference: msg.reference,
                ok,
                response,
            };
        }

        if msg.topic != topic {
            return Inbound::Ignored;
        }

        match msg.event.as_str() {
            EVENT_POSTGRES_CHANGES => msg
                .payload
                .get("data")
                .and_then(|data| data.get("record"))
                .cloned()
                .map(Inbound::Change)
                .unwrap_or(Inbound::Ignored),
            // Legacy frames name the change type as the event
            "INSERT" | "UPDATE" => msg
                .payload
                .get("record")
                .cloned()
                .map(Inbound::Change)
                .unwrap_or(Inbound::Ignored),
            EVENT_ERROR | EVENT_CLOSE => Inbound::ChannelClosed(msg.event),
            _ => Inbound::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame_shape() {
        let filter = ChangeFilter::inserts("public", "community_rewards").where_eq("user_id", "u1");
        let msg = PhoenixMessage::join("realtime:user_rewards_changes", &filter, Some("jwt"), "1");
        let frame = serde_json::to_value(&msg).unwrap();

        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["ref"], "1");
        assert_eq!(frame["join_ref"], "1");
        assert_eq!(frame["payload"]["access_token"], "jwt");
        let changes = &frame["payload"]["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "INSERT");
        assert_eq!(changes["table"], "community_rewards");
        assert_eq!(changes["filter"], "user_id=eq.u1");
    }

    #[test]
    fn test_classify_postgres_change() {
        let msg: PhoenixMessage = serde_json::from_value(json!({
            "topic": "realtime:t",
            "event": "postgres_changes",
            "payload": {
                "ids": [1],
                "data": { "type": "INSERT", "table": "community_rewards", "record": { "id": "r1" } }
            },
            "ref": null
        }))
        .unwrap();

        assert_eq!(
            Inbound::classify(msg, "realtime:t"),
            Inbound::Change(json!({ "id": "r1" }))
        );
    }

    #[test]
    fn test_classify_reply_and_foreign_topic() {
        let reply: PhoenixMessage = serde_json::from_value(json!({
            "topic": "realtime:t", "event": "phx_reply",
            "payload": { "status": "error", "response": { "reason": "unauthorized" } },
            "ref": "1"
        }))
        .unwrap();
        match Inbound::classify(reply, "realtime:t") {
            Inbound::Reply { reference, ok, response } => {
                assert_eq!(reference.as_deref(), Some("1"));
                assert!(!ok);
                assert_eq!(response["reason"], "unauthorized");
            }
            other => panic!("unexpected {:?}", other),
        }

        let other: PhoenixMessage = serde_json::from_value(json!({
            "topic": "realtime:other", "event": "postgres_changes",
            "payload": { "data": { "record": { "id": "x" } } }
        }))
        .unwrap();
        assert_eq!(Inbound::classify(other, "realtime:t"), Inbound::Ignored);
    }
}
