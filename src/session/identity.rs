//! Session identifiers and lifecycle.
//!
//! A session id has the shape `quote_session_<name>_<code>_<epoch_ms>`. The
//! remote processor routes replies by this string, so two sessions must never
//! share one. Without a signed-in user the id degrades to
//! `quote_session_<epoch_ms>`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SESSION_PREFIX: &str = "quote_session";

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]").expect("static regex is valid"));

/// The signed-in user, as supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub first_name: String,
    /// Stable per-user code (the beta code id).
    pub user_code: String,
    /// Display role, e.g. job title.
    pub job_title: String,
    /// Technician UUID, when the auth layer provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_id: Option<String>,
}

impl UserContext {
    pub fn new(
        first_name: impl Into<String>,
        user_code: impl Into<String>,
        job_title: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            user_code: user_code.into(),
            job_title: job_title.into(),
            tech_id: None,
        }
    }

    pub fn with_tech_id(mut self, tech_id: impl Into<String>) -> Self {
        self.tech_id = Some(tech_id.into());
        self
    }

    /// First name with only the first letter upper-cased ("aNA" → "Ana").
    pub fn display_name(&self) -> String {
        let mut chars = self.first_name.chars();
        match chars.next() {
            Some(first) => {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            }
            None => String::new(),
        }
    }
}

/// Lower-case a first name and strip everything outside `[a-z0-9]`.
pub fn normalize_first_name(name: &str) -> String {
    NON_ALNUM.replace_all(&name.to_lowercase(), "").into_owned()
}

/// A logical conversation scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    watermark: DateTime<Utc>,
}

impl Session {
    fn new(id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            watermark: created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Instant of the last successful retrieval; polls ask for items at or after it.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Move the watermark forward. Never moves it backwards.
    pub fn advance_watermark(&mut self, to: DateTime<Utc>) {
        if to > self.watermark {
            self.watermark = to;
        }
    }

    /// Whether this session was built for the given user.
    pub fn belongs_to(&self, user: &UserContext) -> bool {
        let prefix = format!(
            "{SESSION_PREFIX}_{}_{}_",
            normalize_first_name(&user.first_name),
            user.user_code
        );
        self.id.starts_with(&prefix)
    }
}

/// Creates sessions with ids that are unique within the process.
#[derive(Debug, Default)]
pub struct SessionManager {
    last_millis: i64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `user`, or an anonymous one when no user is known.
    pub fn create_session(&mut self, user: Option<&UserContext>) -> Session {
        self.create_session_at(user, Utc::now())
    }

    /// Replace the current session with a fresh one.
    pub fn reset_session(&mut self, current: &Session, user: Option<&UserContext>) -> Session {
        let next = self.create_session(user);
        info!(
            previous = %current.id(),
            session_id = %next.id(),
            "Session reset"
        );
        next
    }

    pub(crate) fn create_session_at(
        &mut self,
        user: Option<&UserContext>,
        now: DateTime<Utc>,
    ) -> Session {
        // Two sessions created within the same millisecond still get distinct ids.
        let millis = now.timestamp_millis().max(self.last_millis + 1);
        self.last_millis = millis;

        let id = match user {
            Some(user) => format!(
                "{SESSION_PREFIX}_{}_{}_{millis}",
                normalize_first_name(&user.first_name),
                user.user_code
            ),
            None => {
                warn!("No user context for session generation, using basic session id");
                format!("{SESSION_PREFIX}_{millis}")
            }
        };

        Session::new(id, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn ana() -> UserContext {
        UserContext::new("Ana-María", "17", "Estimator")
    }

    #[test]
    fn normalizes_first_name() {
        assert_eq!(normalize_first_name("Ana-María"), "anamara");
        assert_eq!(normalize_first_name("  Bob 2 "), "bob2");
        assert_eq!(normalize_first_name("!!!"), "");
    }

    #[test]
    fn display_name_capitalizes() {
        assert_eq!(UserContext::new("aNA", "1", "x").display_name(), "Ana");
        assert_eq!(UserContext::new("", "1", "x").display_name(), "");
    }

    #[test]
    fn session_id_encodes_user_and_instant() {
        let mut manager = SessionManager::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let session = manager.create_session_at(Some(&ana()), at);

        assert_eq!(session.id(), "quote_session_anamara_17_1700000000123");
        assert_eq!(session.created_at(), at);
        assert_eq!(session.watermark(), at);
        assert!(session.belongs_to(&ana()));
    }

    #[test]
    fn anonymous_session_uses_instant_only() {
        let mut manager = SessionManager::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let session = manager.create_session_at(None, at);
        assert_eq!(session.id(), "quote_session_1700000000000");
        assert!(!session.belongs_to(&ana()));
    }

    #[test]
    fn same_millisecond_sessions_do_not_collide() {
        let mut manager = SessionManager::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let a = manager.create_session_at(Some(&ana()), at);
        let b = manager.create_session_at(Some(&ana()), at);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn reset_produces_a_new_id() {
        let mut manager = SessionManager::new();
        let first = manager.create_session(Some(&ana()));
        let second = manager.reset_session(&first, Some(&ana()));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let mut manager = SessionManager::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut session = manager.create_session_at(None, at);

        session.advance_watermark(at + Duration::seconds(5));
        assert_eq!(session.watermark(), at + Duration::seconds(5));

        session.advance_watermark(at + Duration::seconds(1));
        assert_eq!(session.watermark(), at + Duration::seconds(5));
    }
}
