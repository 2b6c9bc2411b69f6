//! # Configuration Settings
//!
//! Defines the configuration structure for the school management backend.

use crate::errors::{Result, SchoolError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Published fallback signing key. Refused outside development.
const DEFAULT_SECRET_KEY: &str = "your-secret-key-here-change-in-production-use-a-long-random-string";

/// Published fallback super admin password. Refused outside development.
const DEFAULT_SUPER_ADMIN_PASSWORD: &str = "superadmin123";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Runtime environment name (`development`, `production`, ...)
    pub environment: String,

    /// Server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Outbound mail configuration
    #[validate(nested)]
    pub mail: MailConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Build the whole configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env()?,
            mail: MailConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_empty() || self.environment.eq_ignore_ascii_case("development")
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(SchoolError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Checks that go beyond what the validator derives can express
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(SchoolError::validation("Database URL must start with 'sqlite:'"));
        }

        if !self.is_development() {
            if self.auth.secret_key.len() < 32 {
                return Err(SchoolError::validation(
                    "SECRET_KEY must be at least 32 characters long outside development",
                ));
            }
            if self.auth.secret_key == DEFAULT_SECRET_KEY {
                return Err(SchoolError::validation_field(
                    "SECRET_KEY must be changed from its default outside development",
                    "secret_key",
                ));
            }
            if self.auth.super_admin.password == DEFAULT_SUPER_ADMIN_PASSWORD {
                return Err(SchoolError::validation_field(
                    "SUPER_ADMIN_PASSWORD must be changed from its default outside development",
                    "super_admin_password",
                ));
            }
        }

        if self.observability.metrics_port != 0 && self.observability.metrics_port == self.server.port
        {
            return Err(SchoolError::validation("Server and metrics ports cannot be the same"));
        }

        url::Url::parse(&self.mail.frontend_url).map_err(|e| {
            SchoolError::validation_field(format!("FRONTEND_URL is not a valid URL: {}", e), "frontend_url")
        })?;

        for origin in &self.server.cors_origins {
            url::Url::parse(origin).map_err(|e| {
                SchoolError::validation_field(
                    format!("CORS origin '{}' is not a valid URL: {}", origin, e),
                    "cors_origins",
                )
            })?;
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Browser origins allowed by CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("SCHOOLHUB_HOST").unwrap_or(defaults.host);

        let port = match std::env::var("SCHOOLHUB_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| SchoolError::config(format!("Invalid SCHOOLHUB_PORT: {}", e)))?,
            Err(_) => defaults.port,
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        Ok(Self { host, port, cors_origins })
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Apply embedded migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/schoolhub.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// True for `sqlite::memory:` style URLs, which need a single shared connection.
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.min_connections);

        let connect_timeout_seconds = std::env::var("DATABASE_CONNECT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.connect_timeout_seconds);

        let idle_timeout_seconds = std::env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.idle_timeout_seconds);

        let auto_migrate = std::env::var("DATABASE_AUTO_MIGRATE")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.auto_migrate);

        Self {
            url,
            max_connections,
            min_connections,
            connect_timeout_seconds,
            idle_timeout_seconds,
            auto_migrate,
        }
    }
}

/// Authentication, token and bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens
    #[validate(length(min = 1, message = "SECRET_KEY cannot be empty"))]
    pub secret_key: String,

    /// Signing algorithm name (HS256, HS384 or HS512)
    #[validate(custom(function = "validate_algorithm"))]
    pub algorithm: String,

    /// Access token lifetime in minutes
    #[validate(range(
        min = 1,
        max = 10080,
        message = "Access token lifetime must be between 1 minute and 7 days"
    ))]
    pub access_token_expire_minutes: i64,

    /// Password setup token lifetime in minutes
    #[validate(range(
        min = 1,
        max = 43200,
        message = "Password token lifetime must be between 1 minute and 30 days"
    ))]
    pub password_token_expire_minutes: i64,

    /// Minimum accepted length for a new password
    #[validate(range(min = 1, max = 128, message = "Minimum password length must be 1..=128"))]
    pub min_password_length: usize,

    /// Identity created by the super-admin bootstrap
    #[validate(nested)]
    pub super_admin: SuperAdminConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            password_token_expire_minutes: 1440,
            min_password_length: 6,
            super_admin: SuperAdminConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Access token lifetime as a chrono duration
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_expire_minutes)
    }

    /// Password setup token lifetime as a chrono duration
    pub fn password_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.password_token_expire_minutes)
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let secret_key = std::env::var("SECRET_KEY").unwrap_or(defaults.secret_key);
        let algorithm = std::env::var("ALGORITHM").unwrap_or(defaults.algorithm);

        let access_token_expire_minutes = env_parse(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            defaults.access_token_expire_minutes,
        )?;
        let password_token_expire_minutes = env_parse(
            "PASSWORD_TOKEN_EXPIRE_MINUTES",
            defaults.password_token_expire_minutes,
        )?;
        let min_password_length =
            env_parse("MIN_PASSWORD_LENGTH", defaults.min_password_length)?;

        Ok(Self {
            secret_key,
            algorithm,
            access_token_expire_minutes,
            password_token_expire_minutes,
            min_password_length,
            super_admin: SuperAdminConfig::from_env(),
        })
    }
}

/// Credentials for the single platform super admin
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SuperAdminConfig {
    #[validate(email(message = "Super admin email must be a valid address"))]
    pub email: String,

    #[validate(length(min = 6, message = "Super admin password must be at least 6 characters"))]
    pub password: String,

    #[validate(length(min = 1, message = "Super admin name cannot be empty"))]
    pub name: String,
}

impl Default for SuperAdminConfig {
    fn default() -> Self {
        Self {
            email: "superadmin@school.local".to_string(),
            password: DEFAULT_SUPER_ADMIN_PASSWORD.to_string(),
            name: "Super Admin".to_string(),
        }
    }
}

impl SuperAdminConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            email: std::env::var("SUPER_ADMIN_EMAIL").unwrap_or(defaults.email),
            password: std::env::var("SUPER_ADMIN_PASSWORD").unwrap_or(defaults.password),
            name: std::env::var("SUPER_ADMIN_NAME").unwrap_or(defaults.name),
        }
    }
}

/// SMTP settings and the frontend base URL used in setup links
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MailConfig {
    /// SMTP relay host; empty disables delivery and only logs messages
    pub server: String,

    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    #[validate(email(message = "MAIL_FROM must be a valid address"))]
    pub from_address: String,

    pub from_name: String,

    /// Use STARTTLS instead of implicit TLS
    pub starttls: bool,

    /// Base URL of the web frontend
    #[validate(url(message = "FRONTEND_URL must be a valid URL"))]
    pub frontend_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 587,
            username: None,
            password: None,
            from_address: "noreply@school.local".to_string(),
            from_name: "School Management System".to_string(),
            starttls: true,
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

impl MailConfig {
    pub fn is_enabled(&self) -> bool {
        !self.server.trim().is_empty()
    }

    /// Build the password setup link for a token value
    pub fn setup_link(&self, token: &str) -> String {
        format!("{}/set-password?token={}", self.frontend_url.trim_end_matches('/'), token)
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            server: std::env::var("MAIL_SERVER").unwrap_or(defaults.server),
            port: env_parse("MAIL_PORT", defaults.port)?,
            username: std::env::var("MAIL_USERNAME").ok().filter(|s| !s.is_empty()),
            password: std::env::var("MAIL_PASSWORD").ok().filter(|s| !s.is_empty()),
            from_address: std::env::var("MAIL_FROM").unwrap_or(defaults.from_address),
            from_name: std::env::var("MAIL_FROM_NAME").unwrap_or(defaults.from_name),
            starttls: std::env::var("MAIL_STARTTLS")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.starttls),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
        })
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            service_name: "schoolhub".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            metrics_port: env_parse("METRICS_PORT", defaults.metrics_port)?,
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: std::env::var("LOG_JSON")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.json_logging),
        })
    }
}

fn validate_algorithm(algorithm: &str) -> std::result::Result<(), validator::ValidationError> {
    match algorithm {
        "HS256" | "HS384" | "HS512" => Ok(()),
        _ => {
            let mut err = validator::ValidationError::new("algorithm");
            err.message = Some("ALGORITHM must be one of HS256, HS384, HS512".into());
            Err(err)
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| SchoolError::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig { environment: "development".to_string(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let auth = AuthConfig::default();
        assert_eq!(auth.algorithm, "HS256");
        assert_eq!(auth.access_token_expire_minutes, 30);
        assert_eq!(auth.password_token_expire_minutes, 1440);
        assert_eq!(auth.min_password_length, 6);
        assert_eq!(auth.super_admin.email, "superadmin@school.local");
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = AppConfig::default();
        config.auth.algorithm = "RS256".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_secret_rejected_in_production() {
        let mut config = AppConfig { environment: "production".to_string(), ..Default::default() };
        config.auth.secret_key = "short".to_string();
        assert!(config.validate().is_err());

        config.environment = "development".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_published_defaults_rejected_in_production() {
        let mut config = AppConfig { environment: "production".to_string(), ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SECRET_KEY"));

        config.auth.secret_key = "a-deployment-specific-secret-of-some-length".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUPER_ADMIN_PASSWORD"));

        config.auth.super_admin.password = "a-real-password".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_sqlite_url_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgresql://localhost/school".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_frontend_url_rejected() {
        let mut config = AppConfig::default();
        config.mail.frontend_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_setup_link_format() {
        let mail = MailConfig {
            frontend_url: "https://school.example/".to_string(),
            ..Default::default()
        };
        assert_eq!(mail.setup_link("abc"), "https://school.example/set-password?token=abc");
    }

    #[test]
    fn test_metrics_bind_address() {
        let mut obs = ObservabilityConfig::default();
        assert!(obs.metrics_bind_address().is_none());
        obs.metrics_port = 9090;
        assert_eq!(obs.metrics_bind_address().as_deref(), Some("0.0.0.0:9090"));
    }

    #[test]
    fn test_in_memory_detection() {
        let db = DatabaseConfig { url: "sqlite::memory:".to_string(), ..Default::default() };
        assert!(db.is_in_memory());
        assert!(!DatabaseConfig::default().is_in_memory());
    }
}
