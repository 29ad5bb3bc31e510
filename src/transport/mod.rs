//! Transport to and from the remote processor.
//!
//! Outbound goes through a [`MessageSink`] (the webhook), inbound comes from a
//! [`MessageSource`] (the retrieval endpoint). The two never talk to each
//! other; they share only the session id and the watermark.

pub mod dispatcher;
pub mod poller;
pub mod retrieval;

pub use dispatcher::{DispatchOutcome, DispatchPayload, OutboundMessage, WebhookDispatcher};
pub use poller::{PollCadence, PollSchedule, Poller};
pub use retrieval::HttpRetriever;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{DispatchError, RetrievalError};
use crate::messages::Message;

/// Where user messages are sent.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Whether an endpoint is configured. When `false`, [`send`](Self::send)
    /// is a no-op that returns [`DispatchOutcome::Skipped`].
    fn is_configured(&self) -> bool;

    /// Deliver one user message. The reply never comes back on this path.
    async fn send(&self, outbound: &OutboundMessage) -> Result<DispatchOutcome, DispatchError>;
}

/// Where assistant replies are fetched from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch messages for `session_id` produced at or after `since`.
    async fn fetch(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RetrievalError>;
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_millis(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
