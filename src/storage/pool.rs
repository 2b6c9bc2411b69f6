//! # Database Connection Pool Management
//!
//! Provides database connection pool creation and management utilities.

use crate::config::DatabaseConfig;
use crate::errors::{Result, SchoolError};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{str::FromStr, time::Duration};

/// Type alias for the database connection pool
pub type DbPool = Pool<Sqlite>;

/// How long a writer waits for the SQLite write lock before failing with SQLITE_BUSY.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    validate_config(config)?;

    let connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            SchoolError::database(
                e,
                format!("Invalid SQLite connection string: {}", sanitize_url(&config.url)),
            )
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(SQLITE_BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal);

    // An in-memory database lives and dies with its connection.
    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        let options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections);
        match config.idle_timeout() {
            Some(idle_timeout) => options.idle_timeout(idle_timeout),
            None => options,
        }
    }
    .acquire_timeout(config.connect_timeout());

    let pool = pool_options.connect_with(connect_options).await.map_err(|e| {
        tracing::error!(
            error = %e,
            url = %sanitize_url(&config.url),
            busy_timeout_ms = SQLITE_BUSY_TIMEOUT.as_millis(),
            "Failed to create SQLite database pool"
        );
        SchoolError::database(
            e,
            format!("Failed to connect to database: {}", sanitize_url(&config.url)),
        )
    })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        in_memory = config.is_in_memory(),
        connect_timeout_ms = config.connect_timeout().as_millis(),
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(SchoolError::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(SchoolError::validation(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if config.url.is_empty() {
        return Err(SchoolError::validation("database URL cannot be empty"));
    }

    if !config.url.starts_with("sqlite:") {
        return Err(SchoolError::validation("database URL must start with 'sqlite:'"));
    }

    Ok(())
}

/// Sanitize database URL for logging (remove credentials)
fn sanitize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.password().is_some() || !parsed.username().is_empty() => format!(
            "{}://***:***@{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or("unknown"),
            parsed.path()
        ),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_valid() {
        let config = DatabaseConfig {
            url: "sqlite://./test.db".to_string(),
            max_connections: 10,
            min_connections: 2,
            ..Default::default()
        };

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config_invalid_min_max() {
        let config = DatabaseConfig {
            url: "sqlite://./test.db".to_string(),
            max_connections: 5,
            min_connections: 10,
            ..Default::default()
        };

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_invalid_url_scheme() {
        let config =
            DatabaseConfig { url: "mysql://localhost/test".to_string(), ..Default::default() };

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_sanitize_url() {
        assert_eq!(sanitize_url("sqlite://./test.db"), "sqlite://./test.db");
        assert_eq!(sanitize_url("invalid-url"), "invalid-url");
    }

    #[tokio::test]
    async fn test_create_in_memory_pool_with_migrations() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate: true,
            ..Default::default()
        };

        let pool = create_pool(&config).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_create_file_pool() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("school.db").display()),
            max_connections: 3,
            auto_migrate: true,
            ..Default::default()
        };

        let pool = create_pool(&config).await.unwrap();
        assert!(dir.path().join("school.db").exists());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM student_parents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
