//! One-time creation of the platform super admin from configuration.

use tracing::{info, instrument, warn};

use crate::auth::hashing;
use crate::auth::user::{NewUser, User};
use crate::config::SuperAdminConfig;
use crate::errors::{Result, SchoolError};
use crate::storage::repositories::user::insert_user;
use crate::storage::repositories::UserRepository;
use crate::storage::DbPool;

/// Result of a bootstrap attempt.
#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    Created(User),
    AlreadyExists,
}

impl BootstrapOutcome {
    pub fn already_exists(&self) -> bool {
        matches!(self, BootstrapOutcome::AlreadyExists)
    }
}

/// Create the configured super admin unless one exists.
///
/// The unique partial index on `users(role) WHERE role = 'SUPER_ADMIN'`
/// decides concurrent calls: the loser sees a unique violation and reports
/// `AlreadyExists` without having written anything.
#[instrument(skip(pool, users, config), fields(email = %config.email), name = "bootstrap_super_admin")]
pub async fn bootstrap_super_admin(
    pool: &DbPool,
    users: &dyn UserRepository,
    config: &SuperAdminConfig,
) -> Result<BootstrapOutcome> {
    if users.find_super_admin().await?.is_some() {
        info!("super admin already exists; nothing to do");
        return Ok(BootstrapOutcome::AlreadyExists);
    }

    let password_hash = hashing::hash_password_blocking(&config.password).await?;
    let new_user = NewUser::super_admin(&config.name, &config.email, password_hash);

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| SchoolError::database(e, "Failed to acquire connection"))?;
    let inserted = insert_user(&mut conn, &new_user).await;
    drop(conn);

    match inserted {
        Ok(user) => {
            info!(user_id = %user.id, "super admin created");
            Ok(BootstrapOutcome::Created(user))
        }
        Err(SchoolError::Conflict { .. }) if users.find_super_admin().await?.is_some() => {
            info!("super admin created concurrently; nothing to do");
            Ok(BootstrapOutcome::AlreadyExists)
        }
        Err(err) => {
            warn!(error = %err, "super admin bootstrap failed");
            Err(err)
        }
    }
}
