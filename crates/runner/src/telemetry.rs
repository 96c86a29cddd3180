//! Tracing setup driven by the logging section of the app config.

use tracing::Level;

use leaveflow_core::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. Call once at process start; a second call
/// panics, which is the desired behavior for a double init.
pub fn init_logging(config: &LoggingConfig) {
    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}
