/// Error types for the messaging core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A REST call failed (transport, non-success status, timeout or bad body)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A second subscribe for a channel that already has a live listener
    #[error("Duplicate subscription on channel {0}")]
    DuplicateSubscription(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    /// An `open` response arrived after another conversation was opened
    #[error("Open of conversation {0} was superseded")]
    Superseded(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;
