//! Core value types
//!
//! - Quote / Position: normalized market state
//! - Order, OrderBatch, OrderSnapshot: opaque order records
//! - Topic: upstream push table

pub mod market_data;
pub mod orders;

pub use market_data::{Position, Quote, Topic, POSITION_PRICE_SCALE};
pub use orders::{Order, OrderBatch, OrderSnapshot};
