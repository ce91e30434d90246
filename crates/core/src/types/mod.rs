//! Shared type definitions and newtypes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credit amount granted by a reward (for clarity in function signatures)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Credits(pub i64);

impl Credits {
    pub fn new(amount: i64) -> Self {
        Credits(amount)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Label shown on the notification, e.g. `+50 Credits`
    pub fn label(&self) -> String {
        format!("+{} Credits", self.0)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An authenticated user session.
///
/// The session's identity is the user id: two sessions with the same user id
/// are the same session as far as subscriptions are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    /// JWT used for row-level security on REST and realtime requests
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Whether two sessions refer to the same authenticated user
    pub fn same_identity(&self, other: &Session) -> bool {
        self.user_id == other.user_id
    }
}
