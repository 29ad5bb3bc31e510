//! Chat client: the conversation driven by dispatch and polling.

pub mod client;
pub mod events;

pub use client::ChatClient;
pub use events::{ChatEvent, ConversationSnapshot, SubmitOutcome};
