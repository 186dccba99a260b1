//! Deduplicated real-time streams for BitMEX
//!
//! Turns the raw `quote`, `position` and `order` push feeds for one instrument into
//! four shareable streams, and backs the order feed with signed REST snapshots.

pub mod context;
pub mod core;
pub mod exchanges;
pub mod feed;
pub mod infrastructure;
pub mod pipeline;
pub mod rest;
pub mod stream;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use context::FeedContext;
pub use infrastructure::config::{Config, FeedConfig, RestConfig};
pub use rest::ExchangeRequestError;

use thiserror::Error;

/// Main error type for the feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeRequestError),

    #[error("Malformed {topic} payload: {reason}")]
    MalformedPayload { topic: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FeedError>;
