//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Result, SchoolError};

/// Create a tracing span for request tracking.
///
/// `school_id` and `user_id` start empty and are recorded by the
/// authentication middleware once the caller is known.
///
/// ```rust,ignore
/// let span = request_span!("GET", "/admin/teachers");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            school_id = tracing::field::Empty,
            user_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            school_id = tracing::field::Empty,
            user_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| SchoolError::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_target(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    result.map_err(|e| SchoolError::config(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        environment = %config.environment,
        server_address = %config.server.bind_address(),
        database_in_memory = config.database.is_in_memory(),
        auto_migrate = config.database.auto_migrate,
        algorithm = %config.auth.algorithm,
        access_token_minutes = config.auth.access_token_expire_minutes,
        password_token_minutes = config.auth.password_token_expire_minutes,
        mail_enabled = config.mail.is_enabled(),
        metrics_port = config.observability.metrics_port,
        "schoolhub configuration"
    );
}
