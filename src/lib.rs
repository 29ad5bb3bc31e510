//! Quote Chat: session-scoped chat client core and its retrieval relay.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod messages;
pub mod relay;
pub mod session;
pub mod transport;
