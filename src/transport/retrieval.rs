//! HTTP retrieval endpoint client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::debug;

use super::{MessageSource, iso_millis};
use crate::config::ChatConfig;
use crate::error::{ConfigError, RetrievalError};
use crate::messages::Message;

/// Fetches replies with `GET <base>/<session_id>?since=<iso>`.
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRetriever {
    pub fn new(config: &ChatConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.retrieval_url).map_err(|e| ConfigError::InvalidValue {
            key: "QUOTE_CHAT_RETRIEVAL_URL".to_string(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_CHAT_RETRIEVAL_URL".to_string(),
                message: format!("{base_url} cannot be used as a base URL"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Full request URL for one poll.
    pub fn session_url(&self, session_id: &str, since: DateTime<Utc>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(session_id);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("since", &iso_millis(since));
        url
    }
}

#[async_trait]
impl MessageSource for HttpRetriever {
    async fn fetch(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RetrievalError> {
        let url = self.session_url(session_id, since);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
            });
        }

        let messages: Vec<Message> = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        debug!(session_id, count = messages.len(), "Retrieved messages");
        Ok(messages)
    }
}
