//! One-time password setup tokens.
//!
//! A setup token is 32 bytes from the OS CSPRNG, URL-safe base64 without
//! padding. It authorizes exactly one password change before it expires;
//! issuing a new one retires any earlier unused token of the same user.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::auth::hashing;
use crate::config::AuthConfig;
use crate::domain::UserId;
use crate::errors::{Result, SchoolError, SetupTokenError};
use crate::observability::metrics;
use crate::storage::repositories::password_token::{self, PasswordTokenRecord};
use crate::storage::repositories::user::set_password_hash;
use crate::storage::DbPool;

/// Random bytes per token (256 bits of entropy).
pub const TOKEN_BYTES: usize = 32;

/// Generate a fresh opaque token value.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decide whether a stored token may still be used at `now`.
///
/// Missing rows are `Invalid`, then `AlreadyUsed`, then `Expired`.
pub fn classify(
    record: Option<&PasswordTokenRecord>,
    now: DateTime<Utc>,
) -> std::result::Result<(), SetupTokenError> {
    match record {
        None => Err(SetupTokenError::Invalid),
        Some(record) if record.is_used => Err(SetupTokenError::AlreadyUsed),
        Some(record) if now > record.expires_at => Err(SetupTokenError::Expired),
        Some(_) => Ok(()),
    }
}

/// Issue a token for `user_id` on the caller's connection, retiring older ones.
#[instrument(skip(conn), fields(user_id = %user_id), name = "issue_setup_token")]
pub async fn issue_token(
    conn: &mut SqliteConnection,
    user_id: UserId,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<PasswordTokenRecord> {
    let retired = password_token::retire_unused_tokens(&mut *conn, user_id).await?;
    if retired > 0 {
        info!(user_id = %user_id, retired, "retired earlier unused setup tokens");
    }

    let record = password_token::insert_token(
        &mut *conn,
        user_id,
        &generate_token_value(),
        now + ttl,
        now,
    )
    .await?;

    metrics::record_setup_token("issued");
    Ok(record)
}

/// Validates and consumes setup tokens.
#[derive(Clone)]
pub struct SetupTokenService {
    pool: DbPool,
    ttl: Duration,
    min_password_length: usize,
}

impl SetupTokenService {
    pub fn new(pool: DbPool, ttl: Duration, min_password_length: usize) -> Self {
        Self { pool, ttl, min_password_length }
    }

    pub fn from_config(pool: DbPool, config: &AuthConfig) -> Self {
        Self::new(pool, config.password_token_ttl(), config.min_password_length)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token in its own transaction.
    pub async fn generate(&self, user_id: UserId) -> Result<PasswordTokenRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to start setup token transaction"))?;

        let record = issue_token(&mut tx, user_id, self.ttl, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to commit setup token"))?;

        Ok(record)
    }

    pub async fn validate(&self, token: &str) -> Result<PasswordTokenRecord> {
        self.validate_at(token, Utc::now()).await
    }

    /// Check a token without consuming it.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<PasswordTokenRecord> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to acquire connection"))?;

        let record = password_token::find_by_token(&mut conn, token).await?;
        classify(record.as_ref(), now)?;
        record.ok_or(SchoolError::SetupToken(SetupTokenError::Invalid))
    }

    pub async fn set_password(&self, token: &str, new_password: &str) -> Result<UserId> {
        self.set_password_at(token, new_password, Utc::now()).await
    }

    /// Consume `token` and set the owner's password, atomically.
    ///
    /// The transaction opens with the compare-and-swap on `is_used`, which takes
    /// SQLite's write lock; a racing call waits on the busy timeout and then
    /// sees the token as used.
    #[instrument(skip(self, token, new_password), name = "set_password_with_token")]
    pub async fn set_password_at(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<UserId> {
        if new_password.chars().count() < self.min_password_length {
            return Err(SchoolError::validation_field(
                format!("Password must be at least {} characters long", self.min_password_length),
                "new_password",
            ));
        }

        // Hash before taking the write lock.
        let password_hash = hashing::hash_password_blocking(new_password).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to start password transaction"))?;

        let claimed = match password_token::claim_token(&mut tx, token).await? {
            Some(record) => record,
            None => {
                let existing = password_token::find_by_token(&mut tx, token).await?;
                let reason = classify(existing.as_ref(), now)
                    .err()
                    .unwrap_or(SetupTokenError::AlreadyUsed);
                warn!(reason = %reason, "setup token rejected");
                metrics::record_setup_token("rejected");
                return Err(reason.into());
            }
        };

        if now > claimed.expires_at {
            // Dropping the transaction rolls the claim back.
            metrics::record_setup_token("rejected");
            return Err(SetupTokenError::Expired.into());
        }

        if !set_password_hash(&mut tx, claimed.user_id, &password_hash).await? {
            warn!(user_id = %claimed.user_id, "setup token belongs to a missing or inactive account");
            metrics::record_setup_token("rejected");
            return Err(SetupTokenError::Invalid.into());
        }

        tx.commit()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to commit password change"))?;

        metrics::record_setup_token("consumed");
        info!(user_id = %claimed.user_id, "password set via setup token");
        Ok(claimed.user_id)
    }
}
