//! Exchange-specific implementations

pub mod bitmex;
pub mod traits;

pub use bitmex::BitmexWsClient;
pub use traits::{FeedBatch, RealtimeClient};
