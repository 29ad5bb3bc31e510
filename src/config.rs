//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::session::UserContext;
use crate::transport::PollCadence;

/// Default retrieval base URL (a locally running relay).
pub const DEFAULT_RETRIEVAL_URL: &str = "http://127.0.0.1:8888/chat-messages";

/// Default source tag sent with every dispatch.
pub const DEFAULT_SOURCE_TAG: &str = "TradeSphere";

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Webhook of the remote processor. `None` puts dispatch in degraded mode.
    pub webhook_url: Option<SecretString>,
    /// Base URL of the retrieval endpoint; the session id is appended as a path segment.
    pub retrieval_url: String,
    /// Tag identifying this client in the dispatch payload.
    pub source_tag: String,
    /// Company name used in the default welcome text.
    pub company_name: String,
    /// Welcome text for sessions without a user context.
    pub welcome_message: Option<String>,
    /// Poll schedule.
    pub cadence: PollCadence,
    /// Per-request HTTP timeout for dispatch and retrieval.
    pub http_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            retrieval_url: DEFAULT_RETRIEVAL_URL.to_string(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            company_name: DEFAULT_SOURCE_TAG.to_string(),
            welcome_message: None,
            cadence: PollCadence::default(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ChatConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let webhook_url = lookup("QUOTE_CHAT_WEBHOOK_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let retrieval_url = lookup("QUOTE_CHAT_RETRIEVAL_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.retrieval_url);

        let source_tag = lookup("QUOTE_CHAT_SOURCE_TAG").unwrap_or(defaults.source_tag);
        let company_name = lookup("QUOTE_CHAT_COMPANY_NAME").unwrap_or(defaults.company_name);
        let welcome_message = lookup("QUOTE_CHAT_WELCOME_MESSAGE").filter(|s| !s.trim().is_empty());

        let cadence = PollCadence {
            fast: millis(&lookup, "QUOTE_CHAT_POLL_FAST_MS", defaults.cadence.fast)?,
            regular: millis(&lookup, "QUOTE_CHAT_POLL_REGULAR_MS", defaults.cadence.regular)?,
            warmup: millis(&lookup, "QUOTE_CHAT_POLL_WARMUP_MS", defaults.cadence.warmup)?,
        };
        for (key, value) in [
            ("QUOTE_CHAT_POLL_FAST_MS", cadence.fast),
            ("QUOTE_CHAT_POLL_REGULAR_MS", cadence.regular),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "poll interval must be greater than zero".to_string(),
                });
            }
        }

        let http_timeout = Duration::from_secs(parse_u64(
            &lookup,
            "QUOTE_CHAT_HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        )?);
        if http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_CHAT_HTTP_TIMEOUT_SECS".to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            webhook_url,
            retrieval_url,
            source_tag,
            company_name,
            welcome_message,
            cadence,
            http_timeout,
        })
    }

    /// Welcome text shown when no user context is available.
    pub fn default_welcome(&self) -> String {
        self.welcome_message
            .clone()
            .unwrap_or_else(|| format!("Welcome to {}! How can I help you today?", self.company_name))
    }
}

/// Read the signed-in user from the environment.
///
/// Returns `None` unless both `QUOTE_CHAT_FIRST_NAME` and `QUOTE_CHAT_USER_CODE` are set.
pub fn user_context_from_env() -> Option<UserContext> {
    user_context_from_lookup(|key| std::env::var(key).ok())
}

pub(crate) fn user_context_from_lookup<F>(lookup: F) -> Option<UserContext>
where
    F: Fn(&str) -> Option<String>,
{
    let first_name = lookup("QUOTE_CHAT_FIRST_NAME").filter(|s| !s.trim().is_empty())?;
    let user_code = lookup("QUOTE_CHAT_USER_CODE").filter(|s| !s.trim().is_empty())?;
    let job_title = lookup("QUOTE_CHAT_JOB_TITLE").unwrap_or_else(|| "Technician".to_string());

    let mut user = UserContext::new(first_name, user_code, job_title);
    if let Some(tech_id) = lookup("QUOTE_CHAT_TECH_ID").filter(|s| !s.trim().is_empty()) {
        user = user.with_tech_id(tech_id);
    }
    Some(user)
}

pub(crate) fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_u64(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}
