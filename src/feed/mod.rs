//! Raw feed: upstream batches → per-topic broadcast channels

pub mod adapter;

pub use adapter::{extract_position, extract_quote, FeedAdapter, MissingSymbolPolicy, RawChannels};
