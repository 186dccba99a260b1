//! Infrastructure - everything around the streams
//!
//! - Configuration loading
//! - Logging setup
//! - Feed metrics

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{Config, ConfigError, FeedConfig, LoggingConfig, RestConfig};
pub use logging::init_logging;
pub use metrics::{FeedMetrics, MetricsSnapshot};
