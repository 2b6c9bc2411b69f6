//! Argon2id password hashing.
//!
//! Hashing and verification are CPU bound for tens of milliseconds. Request
//! paths go through the `_blocking` variants, which run the work on tokio's
//! blocking pool instead of an async worker thread.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::{Result, SchoolError};

fn password_hasher() -> Result<Argon2<'static>> {
    // OWASP baseline for Argon2id: 19 MiB, two passes, single lane.
    const MEMORY_COST_KIB: u32 = 19 * 1024;
    const ITERATIONS: u32 = 2;
    const PARALLELISM: u32 = 1;
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, PARALLELISM, Some(32))
        .map_err(|e| SchoolError::internal(format!("Invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    password_hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SchoolError::internal(format!("Failed to hash password: {}", e)))
}

/// Constant-time check of a plaintext password against a stored PHC string.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| SchoolError::internal(format!("Invalid stored password hash: {}", e)))?;

    match password_hasher()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(SchoolError::internal(format!("Password verification failed: {}", e))),
    }
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: &str) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| SchoolError::internal(format!("Password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| SchoolError::internal(format!("Password verification task failed: {}", e)))?
}
