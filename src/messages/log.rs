//! Ordered, id-unique message log.

use std::collections::HashSet;

use super::model::Message;

/// Insertion-ordered message log keyed by message id.
///
/// No two entries share an id. Entries are only ever removed by replacing the
/// whole log on session reset.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns `false` (and leaves the log unchanged) if the id is taken.
    pub fn push(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.entries.push(message);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }

    /// Messages appended at or after position `from`.
    pub fn since(&self, from: usize) -> &[Message] {
        &self.entries[from.min(self.entries.len())..]
    }
}
