//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{env_vars, LoggingConfig};

/// Build the env filter for log level control.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "merobridge_core={lvl},merobridge_devices={lvl}",
            lvl = config.level
        ))
        .add_directive(tracing::Level::WARN.into())
    })
}

/// Install the global tracing subscriber.
///
/// JSON output is selected by `config.json` or `MEROBRIDGE_LOG_JSON=true`.
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let json_logging = config.json
        || std::env::var(env_vars::LOG_JSON)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

    let filter = env_filter(config);

    let result = if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .try_init()
    };

    result.is_ok()
}
