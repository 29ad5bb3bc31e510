//! Merge fetched messages into the log.
//!
//! Remote order is authoritative for new items. Anything whose id is already
//! in the log is a duplicate delivery and is dropped without complaint.

use tracing::debug;

use super::log::MessageLog;
use super::model::Message;

/// Append every message in `incoming` whose id is not yet in `log`, in the
/// order supplied. Returns `true` if at least one message was accepted.
///
/// Calling this again with the same batch is a no-op.
pub fn merge(log: &mut MessageLog, incoming: impl IntoIterator<Item = Message>) -> bool {
    let mut accepted = 0usize;
    let mut duplicates = 0usize;

    for message in incoming {
        if log.push(message) {
            accepted += 1;
        } else {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        debug!(accepted, duplicates, "Dropped duplicate messages during merge");
    }

    accepted > 0
}
