//! Conversation state: session, message log, turn phase.

#[allow(clippy::module_inception)]
pub mod conversation;
pub mod metrics;
pub mod phase;

pub use conversation::{
    Conversation, DISPATCH_ERROR_TEXT, DispatchApplied, PollApplied, Rejection,
    WELCOME_MESSAGE_ID, welcome_text,
};
pub use metrics::PerformanceMetrics;
pub use phase::ConversationPhase;
