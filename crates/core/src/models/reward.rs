//! Community reward models for the `community_rewards` table

use crate::{Credits, Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `community_rewards` row as delivered by PostgREST and the realtime channel.
///
/// The table stores `type`, `points` and `description`; older payloads use the
/// client names (`reward_type`, `credits_earned`, `trigger_action`), so both are
/// accepted. Every field is optional here: validation happens in
/// [`CommunityReward::try_from`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "type", alias = "reward_type")]
    pub reward_type: Option<String>,
    #[serde(default, rename = "points", alias = "credits_earned")]
    pub points: Option<f64>,
    #[serde(default, rename = "description", alias = "trigger_action")]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub is_validated: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A backend-issued credit grant delivered to the client for display.
///
/// Constructed only through validation and never mutated afterwards: the type
/// has read accessors and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityReward {
    id: String,
    user_id: String,
    reward_type: String,
    credits_earned: Credits,
    trigger_action: String,
    reference_id: Option<String>,
    reference_type: Option<String>,
    metadata: Option<Value>,
    is_validated: bool,
    created_at: DateTime<Utc>,
}

impl CommunityReward {
    /// Decode and validate a JSON payload from the realtime channel or REST
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let row: RewardRow = serde_json::from_value(payload.clone())
            .map_err(|e| Error::MalformedReward(e.to_string()))?;
        Self::try_from(row)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn reward_type(&self) -> &str {
        &self.reward_type
    }

    pub fn credits_earned(&self) -> Credits {
        self.credits_earned
    }

    pub fn trigger_action(&self) -> &str {
        &self.trigger_action
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    pub fn reference_type(&self) -> Option<&str> {
        self.reference_type.as_deref()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn is_validated(&self) -> bool {
        self.is_validated
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl TryFrom<RewardRow> for CommunityReward {
    type Error = Error;

    fn try_from(row: RewardRow) -> Result<Self> {
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::MalformedReward("missing id".to_string()))?;

        let points = row
            .points
            .ok_or_else(|| Error::MalformedReward(format!("reward {} has no amount", id)))?;
        if !points.is_finite() {
            return Err(Error::MalformedReward(format!(
                "reward {} has a non-finite amount",
                id
            )));
        }

        let reward_type = row.reward_type.unwrap_or_else(|| "default".to_string());

        let reference_id = row.reference_id.or_else(|| {
            row.metadata.as_ref().and_then(|m| {
                m.get("post_id")
                    .or_else(|| m.get("review_id"))
                    .and_then(value_as_string)
            })
        });

        let created_at = row
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            reference_type: row.reference_type.or_else(|| Some(reward_type.clone())),
            id,
            user_id: row.user_id.unwrap_or_default(),
            reward_type,
            credits_earned: Credits::new(points.round() as i64),
            trigger_action: row.description.unwrap_or_default(),
            reference_id,
            metadata: row.metadata,
            is_validated: row.is_validated.unwrap_or(false),
            created_at,
        })
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse RFC 3339 or the Postgres text form (`2024-05-01 12:00:00.123+00`)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
