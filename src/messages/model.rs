//! Message model shared by the client, the retrieval endpoint and the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed by the local user.
    User,
    /// Produced by the assistant (remote replies and local error notices).
    Ai,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Ai => "ai",
        };
        write!(f, "{s}")
    }
}

/// A single chat message. Immutable once created.
///
/// The wire form is `{id, text, sender, timestamp, sessionId}`. `sessionId` may
/// be missing on messages from older processors, in which case the message is
/// attributed to whichever session fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Message {
    /// A locally authored message with a fresh random id.
    pub fn local(sender: Sender, text: impl Into<String>, session_id: &str) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), sender, text, session_id)
    }

    pub fn with_id(
        id: impl Into<String>,
        sender: Sender,
        text: impl Into<String>,
        session_id: &str,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            session_id: Some(session_id.to_string()),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this message may be merged into `session_id`.
    pub fn addressed_to(&self, session_id: &str) -> bool {
        self.session_id.as_deref().is_none_or(|id| id == session_id)
    }
}
