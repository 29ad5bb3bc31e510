//! Inbound poller and its cadence.
//!
//! The schedule is purely time-driven: tight polling for a warm-up window
//! after the anchor (start, reset, or a dispatch), regular polling after
//! that. It never stops because nothing arrived.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::MessageSource;
use crate::error::RetrievalError;
use crate::messages::Message;
use crate::session::Session;

/// Poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    /// Interval during the warm-up window.
    pub fast: Duration,
    /// Interval once the warm-up window has passed.
    pub regular: Duration,
    /// Length of the warm-up window.
    pub warmup: Duration,
}

impl Default for PollCadence {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(1500),
            regular: Duration::from_millis(3000),
            warmup: Duration::from_secs(10),
        }
    }
}

impl PollCadence {
    /// Interval to use when `since_anchor` has elapsed since the last anchor.
    pub fn interval_after(&self, since_anchor: Duration) -> Duration {
        if since_anchor < self.warmup {
            self.fast
        } else {
            self.regular
        }
    }
}

/// Tracks when the next poll is due.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    cadence: PollCadence,
    anchor: Instant,
    next_due: Instant,
}

impl PollSchedule {
    /// Start a schedule anchored at `now`; the first poll is one fast interval away.
    pub fn new(cadence: PollCadence, now: Instant) -> Self {
        Self {
            cadence,
            anchor: now,
            next_due: now + cadence.fast,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Restart the warm-up window at `now`. Pulls the next poll in if the
    /// current one is further out than a fast interval.
    pub fn reanchor(&mut self, now: Instant) {
        self.anchor = now;
        self.next_due = self.next_due.min(now + self.cadence.fast);
    }

    /// Record that a poll finished at `now` and schedule the next one.
    pub fn completed(&mut self, now: Instant) {
        let interval = self
            .cadence
            .interval_after(now.saturating_duration_since(self.anchor));
        self.next_due = now + interval;
    }
}

/// Fetches new replies for a session from a [`MessageSource`].
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn MessageSource>,
}

impl Poller {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self { source }
    }

    /// Fetch messages for `session` produced at or after its watermark.
    pub async fn poll(&self, session: &Session) -> Result<Vec<Message>, RetrievalError> {
        let messages = self.source.fetch(session.id(), session.watermark()).await?;
        if !messages.is_empty() {
            debug!(
                session_id = %session.id(),
                count = messages.len(),
                "Poll returned messages"
            );
        }
        Ok(messages)
    }
}
