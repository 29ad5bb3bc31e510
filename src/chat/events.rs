//! What the chat client tells its rendering surface.

use std::time::Duration;

use serde::Serialize;

use crate::conversation::{ConversationPhase, Rejection};
use crate::messages::Message;
use crate::session::{Session, UserContext};

/// A change to the conversation, broadcast to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new session replaced the previous one; `messages` is its opening log.
    SessionStarted {
        session_id: String,
        messages: Vec<Message>,
    },
    /// A message was appended to the log.
    MessageAppended { message: Message },
    /// The turn phase changed.
    PhaseChanged { phase: ConversationPhase },
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The local echo was appended and the message is being dispatched.
    Submitted { message_id: String },
    /// Nothing was sent.
    Rejected(Rejection),
}

/// Point-in-time copy of the conversation.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub session: Session,
    pub user: Option<UserContext>,
    pub phase: ConversationPhase,
    pub messages: Vec<Message>,
    pub webhook_latency: Option<Duration>,
    pub total_response_time: Option<Duration>,
    /// How long the outstanding turn has waited for a reply.
    pub waiting_for: Option<Duration>,
}
