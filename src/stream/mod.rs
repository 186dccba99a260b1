//! Stream primitives
//!
//! - shared: reference-counted multicast (`SharedStream`)
//! - distinct: change detection against the last emitted value
//! - switch: generation counter for switch-to-latest

pub mod distinct;
pub mod shared;
pub mod switch;

pub use distinct::{distinct_until_changed, DistinctUntilChanged};
pub use shared::{Emitter, SharedStream, Subscription, DEFAULT_CAPACITY};
pub use switch::SwitchLatest;
