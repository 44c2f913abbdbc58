//! Logging setup utilities for the relay backend.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The default applies to the given application crate; it can be overridden
/// at runtime through the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `app_name` - The package name of the application (e.g., "kakehashi-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info")
pub fn setup_logger(app_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}={}",
                    app_name.replace("-", "_"),
                    default_log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
