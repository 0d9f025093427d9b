//! Error types for postq
//!
//! The queue core itself never fails. These errors describe rejected requests
//! at the transport boundary.

use thiserror::Error;

/// Main error type for postq operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Queue has never been referenced
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// No message became available within the requested window
    #[error("No message available in queue: {0}")]
    NoMessage(String),

    /// Message missing or malformed
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Timeout parameter could not be parsed
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// Queue name is not valid UTF-8 after percent-decoding
    #[error("Invalid queue name: {0}")]
    InvalidQueueName(String),
}

/// Result type alias for postq operations
pub type Result<T> = std::result::Result<T, Error>;
