//! Error types for quote-chat.

/// Top-level error type for the chat client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Outbound dispatch failures (the transport error of the webhook path).
///
/// A missing webhook is not represented here: it is a silent no-op.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No user context available for dispatch")]
    Unauthenticated,

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Webhook request failed: {0}")]
    Network(String),
}

/// Inbound retrieval failures. Always swallowed by the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval endpoint returned status {status}")]
    Status { status: u16 },

    #[error("Retrieval request failed: {0}")]
    Network(String),

    #[error("Malformed retrieval response: {0}")]
    Decode(String),
}

/// Errors talking to a running chat client task.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Chat client has shut down")]
    Closed,
}

/// Result type alias for the chat client.
pub type Result<T> = std::result::Result<T, Error>;
