//! Denylist of access tokens revoked before their natural expiry, keyed by `jti`.

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use crate::domain::UserId;
use crate::errors::{Result, SchoolError};
use crate::storage::DbPool;

#[async_trait]
pub trait RevokedTokenRepository: Send + Sync {
    /// Record a revocation. Revoking the same token twice is a no-op.
    async fn revoke(&self, jti: &str, user_id: UserId, expires_at: i64) -> Result<()>;

    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    /// Drop entries whose token would have expired anyway by `now` (unix seconds).
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct SqlxRevokedTokenRepository {
    pool: DbPool,
}

impl SqlxRevokedTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevokedTokenRepository for SqlxRevokedTokenRepository {
    #[instrument(skip(self, jti), fields(user_id = %user_id), name = "db_revoke_token")]
    async fn revoke(&self, jti: &str, user_id: UserId, expires_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to revoke token"))?;

        Ok(())
    }

    #[instrument(skip(self, jti), name = "db_is_token_revoked")]
    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM revoked_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchoolError::database(e, "Failed to check token revocation"))?;

        Ok(found.is_some())
    }

    #[instrument(skip(self), name = "db_purge_revoked_tokens")]
    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| SchoolError::database(e, "Failed to purge revoked tokens"))?;

        Ok(result.rows_affected())
    }
}
