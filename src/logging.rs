//! Tracing subscriber setup
//!
//! Combines an [`EnvFilter`] with a fmt layer:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else configured level)
//!   └── Fmt Layer (console output, text or JSON)
//! ```

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Errors that can occur while installing the subscriber
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: `RUST_LOG` wins, otherwise `level`
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber
///
/// # Example
///
/// ```no_run
/// use fileferry::config::LoggingConfig;
/// use fileferry::logging::init_subscriber;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// init_subscriber(&LoggingConfig::default())?;
/// tracing::info!("Subscriber is now active");
/// # Ok(())
/// # }
/// ```
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(&config.level);

    let result = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json();
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(fmt_layer),
        )
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true);
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(fmt_layer),
        )
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
