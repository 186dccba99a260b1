//! Logging setup
//!
//! Console output always; a daily rolling file under `logging.directory` when
//! configured. Targets used across the crate:
//! - quote, position, orders, order_events: public streams
//! - feed: raw adapter
//! - ws, rest: exchange transports
//! - stream: shared stream lifecycle

use super::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// File name prefix of the rolling log
pub const LOG_FILE_PREFIX: &str = "bitmex-streams";

/// Initialize logging
///
/// Returns the appender guards, which must be kept alive for the duration of
/// the program. `RUST_LOG` takes precedence over `config.level`.
pub fn init_logging(config: &LoggingConfig) -> crate::Result<Vec<WorkerGuard>> {
    let filter = env_filter(&config.level)?;
    let mut guards = Vec::new();

    let file_layer: Option<Box<dyn Layer<Registry> + Send + Sync>> = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let (appender, guard) = create_appender(dir, LOG_FILE_PREFIX);
            guards.push(guard);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true);
            Some(if config.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        None => None,
    };

    // Console layer
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(filter)
        .try_init()
        .map_err(|e| crate::FeedError::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(target: "feed", "Logging initialized at {}", config.level);

    Ok(guards)
}

/// `RUST_LOG` if set, otherwise `level`
fn env_filter(level: &str) -> crate::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| crate::FeedError::Config(format!("invalid log level {:?}: {}", level, e)))
}

/// Create a rolling file appender
fn create_appender(dir: &std::path::Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_directives() {
        assert!(EnvFilter::try_new("info,ws=debug,orders=trace").is_ok());
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(env_filter("feed=notalevel").is_err());
    }

    #[test]
    fn test_appender_creates_file() {
        let dir = std::env::temp_dir().join(format!("bitmex-streams-log-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        {
            let (_writer, guard) = create_appender(&dir, LOG_FILE_PREFIX);
            drop(guard);
        }
        let created = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX));
        assert!(created);
        fs::remove_dir_all(&dir).ok();
    }
}
