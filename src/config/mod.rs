//! # Configuration Management
//!
//! Configuration is read once at startup (after loading `.env` via `dotenvy`)
//! into an immutable [`AppConfig`] that is shared through `Arc`.

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, MailConfig, ObservabilityConfig, ServerConfig,
    SuperAdminConfig,
};

use crate::errors::Result;

/// Load `.env` (if present), read the environment and validate the result.
pub fn load() -> Result<AppConfig> {
    // A missing .env file is normal in containers.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;
    config.validate()?;
    Ok(config)
}
