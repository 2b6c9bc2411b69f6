//! # Storage and Persistence
//!
//! SQLite connectivity, embedded migrations and the repositories for schools,
//! users, student/parent links, password setup tokens and revoked access tokens.

pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use migrations::{list_applied_migrations, validate_migrations, MigrationInfo};
pub use pool::{create_pool, DbPool};
pub use repositories::{
    MemberCounts, PasswordTokenRecord, RevokedTokenRepository, SchoolRepository,
    SqlxRevokedTokenRepository, SqlxSchoolRepository, SqlxStudentParentRepository,
    SqlxUserRepository, StudentParentLink, StudentParentRepository, UserRepository,
};

use crate::errors::{Result, SchoolError};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| SchoolError::database(e, "Database connectivity check failed"))?;

    Ok(())
}
