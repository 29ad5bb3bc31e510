//! Conversation phase state machine.

use serde::{Deserialize, Serialize};

/// Phase of the current conversation turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Ready for user input.
    #[default]
    Idle,
    /// A message was dispatched and no reply has been accepted yet.
    AwaitingReply,
}

impl ConversationPhase {
    /// Check if this phase allows transitioning to another phase.
    pub fn can_transition_to(&self, target: ConversationPhase) -> bool {
        use ConversationPhase::*;

        matches!((self, target), (Idle, AwaitingReply) | (AwaitingReply, Idle))
    }

    /// Whether the user may submit a new message.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a "thinking" indicator should be shown.
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::AwaitingReply)
    }
}

impl std::fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingReply => "awaiting_reply",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        use ConversationPhase::*;
        assert!(Idle.can_transition_to(AwaitingReply));
        assert!(AwaitingReply.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Idle));
        assert!(!AwaitingReply.can_transition_to(AwaitingReply));
    }

    #[test]
    fn input_and_indicator() {
        assert!(ConversationPhase::Idle.accepts_input());
        assert!(!ConversationPhase::Idle.is_thinking());
        assert!(!ConversationPhase::AwaitingReply.accepts_input());
        assert!(ConversationPhase::AwaitingReply.is_thinking());
    }

    #[test]
    fn serde_and_display() {
        let json = serde_json::to_string(&ConversationPhase::AwaitingReply).unwrap();
        assert_eq!(json, "\"awaiting_reply\"");
        assert_eq!(ConversationPhase::AwaitingReply.to_string(), "awaiting_reply");
        let parsed: ConversationPhase = serde_json::from_str("\"idle\"").unwrap();
        assert_eq!(parsed, ConversationPhase::Idle);
    }
}
