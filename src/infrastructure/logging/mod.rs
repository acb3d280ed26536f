// Logging module - Logging infrastructure
use crate::domain::error::{UartMonError, UartMonResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) -> UartMonResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("uartmon={},warn", level)))
        .map_err(|e| UartMonError::config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| UartMonError::config(format!("Logging already initialized: {}", e)))?;

    tracing::debug!("uartmon logging initialized at {}", level);
    Ok(())
}
