//! Chat messages, the ordered message log, and reconciliation of fetched replies.

pub mod log;
pub mod model;
pub mod reconciler;

pub use log::MessageLog;
pub use model::{Message, Sender};
pub use reconciler::merge;
