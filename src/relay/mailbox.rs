//! In-memory per-session reply store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::messages::Message;

#[derive(Debug, Default)]
struct SessionBox {
    messages: Vec<Message>,
    last_activity: Option<DateTime<Utc>>,
}

/// Replies waiting to be fetched, keyed by session id.
///
/// Messages are never removed on read: the client filters by watermark and
/// dedupes by id, so a fetch may repeat what an earlier fetch returned.
#[derive(Debug, Default)]
pub struct Mailbox {
    sessions: RwLock<HashMap<String, SessionBox>>,
}

impl Mailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a message for `session_id`. The message's `session_id` is
    /// overwritten with the mailbox key.
    pub async fn deliver(&self, session_id: &str, mut message: Message) -> Message {
        message.session_id = Some(session_id.to_string());

        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(session_id.to_string()).or_default();
        slot.last_activity = Some(Utc::now());
        slot.messages.push(message.clone());

        debug!(session_id, message_id = %message.id, "Reply stored");
        message
    }

    /// Messages for `session_id` with a timestamp at or after `since`,
    /// oldest first.
    pub async fn fetch(&self, session_id: &str, since: Option<DateTime<Utc>>) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        let Some(slot) = sessions.get(session_id) else {
            return Vec::new();
        };

        let mut messages: Vec<Message> = slot
            .messages
            .iter()
            .filter(|m| since.is_none_or(|since| m.timestamp >= since))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions with no delivery for longer than `retention`.
    /// Returns how many were removed.
    pub async fn prune_older_than(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_activity.is_some_and(|at| at >= cutoff));
        let removed = before - sessions.len();

        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Pruned idle relay sessions");
        }
        removed
    }
}

/// Spawn a background task that prunes idle sessions every `every`.
pub fn spawn_prune_task(
    mailbox: Arc<Mailbox>,
    every: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            mailbox.prune_older_than(retention).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Sender;

    fn reply(id: &str, at: DateTime<Utc>) -> Message {
        Message::with_id(id, Sender::Ai, "hi", "ignored").at(at)
    }

    #[tokio::test]
    async fn deliver_rewrites_session_id() {
        let mailbox = Mailbox::new();
        let stored = mailbox.deliver("s1", reply("m1", Utc::now())).await;
        assert_eq!(stored.session_id.as_deref(), Some("s1"));
        assert_eq!(mailbox.fetch("s1", None).await.len(), 1);
        assert!(mailbox.fetch("s2", None).await.is_empty());
    }

    #[tokio::test]
    async fn fetch_since_is_inclusive_and_ordered() {
        let mailbox = Mailbox::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let t2 = t0 + chrono::Duration::seconds(2);

        mailbox.deliver("s1", reply("late", t2)).await;
        mailbox.deliver("s1", reply("early", t0)).await;
        mailbox.deliver("s1", reply("middle", t1)).await;

        let ids: Vec<String> = mailbox
            .fetch("s1", Some(t1))
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["middle", "late"]);

        // Reads do not consume.
        assert_eq!(mailbox.fetch("s1", None).await.len(), 3);
    }

    #[tokio::test]
    async fn prune_drops_idle_sessions_only() {
        let mailbox = Mailbox::new();
        mailbox.deliver("s1", reply("m1", Utc::now())).await;

        assert_eq!(mailbox.prune_older_than(Duration::from_secs(3600)).await, 0);
        assert_eq!(mailbox.session_count().await, 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(mailbox.prune_older_than(Duration::ZERO).await, 1);
        assert_eq!(mailbox.session_count().await, 0);
    }
}
