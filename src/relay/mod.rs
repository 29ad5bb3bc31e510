//! Retrieval relay: the mailbox the remote processor posts replies to and the
//! chat client polls.

pub mod mailbox;
pub mod routes;

pub use mailbox::{Mailbox, spawn_prune_task};
pub use routes::relay_routes;

use std::time::Duration;

use tracing::info;

use crate::config::parse_u64;
use crate::error::ConfigError;

/// How often idle sessions are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Sessions with no delivery for this long are dropped.
    pub retention: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            retention: Duration::from_secs(3600),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_u64(&lookup, "QUOTE_RELAY_PORT", u64::from(defaults.port))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
            key: "QUOTE_RELAY_PORT".to_string(),
            message: format!("{port} is not a valid port"),
        })?;

        let retention = Duration::from_secs(parse_u64(
            &lookup,
            "QUOTE_RELAY_RETENTION_SECS",
            defaults.retention.as_secs(),
        )?);

        Ok(Self { port, retention })
    }
}

/// Serve the relay on `listener` until the task is dropped or the server fails.
pub async fn serve(listener: tokio::net::TcpListener, config: &RelayConfig) -> crate::error::Result<()> {
    let mailbox = Mailbox::new();
    let _prune = spawn_prune_task(mailbox.clone(), PRUNE_INTERVAL, config.retention);

    let app = relay_routes(mailbox);
    info!(addr = %listener.local_addr()?, "Relay server started");
    axum::serve(listener, app).await?;
    Ok(())
}
