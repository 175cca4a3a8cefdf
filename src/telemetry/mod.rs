pub mod instrumentation;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, WorkshopError};

pub use instrumentation::{ActionMetrics, Instrumentation, InstrumentationSnapshot, SessionGuard};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| WorkshopError::Config(format!("Invalid log level '{}': {}", config.level, e)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| WorkshopError::Config(format!("Failed to initialise logging: {}", e)))
}
