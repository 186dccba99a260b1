//! Public stream pipelines
//!
//! - quote: deduplicated top of book
//! - position: deduplicated position (cent-tolerant price)
//! - orders: raw order events and switch-to-latest open order snapshots

pub mod orders;
pub mod position;
pub mod quote;

pub use orders::{open_orders, order_events};
pub use position::position_changes;
pub use quote::quote_changes;
