//! Password setup token persistence.
//!
//! All functions run on a caller-supplied connection so the setup-token
//! service can compose them inside one transaction.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::instrument;

use crate::domain::UserId;
use crate::errors::{Result, SchoolError};

/// Stored one-time token.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PasswordTokenRecord {
    pub id: i64,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

#[instrument(skip(conn, token), fields(user_id = %user_id), name = "db_insert_password_token")]
pub async fn insert_token(
    conn: &mut SqliteConnection,
    user_id: UserId,
    token: &str,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> Result<PasswordTokenRecord> {
    sqlx::query_as::<_, PasswordTokenRecord>(
        r#"
        INSERT INTO password_tokens (user_id, token, expires_at, is_used, created_at)
        VALUES (?, ?, ?, 0, ?)
        RETURNING id, user_id, token, expires_at, is_used, created_at
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(expires_at)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| SchoolError::database(e, "Failed to store password token"))
}

/// Mark every still-unused token of a user as used. Returns how many were retired.
#[instrument(skip(conn), fields(user_id = %user_id), name = "db_retire_password_tokens")]
pub async fn retire_unused_tokens(conn: &mut SqliteConnection, user_id: UserId) -> Result<u64> {
    let result =
        sqlx::query("UPDATE password_tokens SET is_used = 1 WHERE user_id = ? AND is_used = 0")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SchoolError::database(e, "Failed to retire password tokens"))?;

    Ok(result.rows_affected())
}

#[instrument(skip(conn, token), name = "db_find_password_token")]
pub async fn find_by_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<PasswordTokenRecord>> {
    sqlx::query_as::<_, PasswordTokenRecord>(
        "SELECT id, user_id, token, expires_at, is_used, created_at FROM password_tokens WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| SchoolError::database(e, "Failed to fetch password token"))
}

/// Compare-and-swap `is_used` from false to true. Returns the claimed row, or
/// `None` if the token does not exist or was already used.
#[instrument(skip(conn, token), name = "db_claim_password_token")]
pub async fn claim_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<PasswordTokenRecord>> {
    sqlx::query_as::<_, PasswordTokenRecord>(
        r#"
        UPDATE password_tokens SET is_used = 1
        WHERE token = ? AND is_used = 0
        RETURNING id, user_id, token, expires_at, is_used, created_at
        "#,
    )
    .bind(token)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| SchoolError::database(e, "Failed to claim password token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Role, TenantScope};
    use crate::auth::user::NewUser;
    use crate::storage::repositories::user::insert_user;
    use crate::storage::test_helpers::{insert_school, migrated_pool};
    use chrono::Duration;

    #[tokio::test]
    async fn claim_is_single_shot() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let mut conn = pool.acquire().await.unwrap();
        let user = insert_user(
            &mut conn,
            &NewUser::member(&scope, Role::Teacher, "T", "t@a.io", None).unwrap(),
        )
        .await
        .unwrap();

        let now = Utc::now();
        insert_token(&mut conn, user.id, "tok", now + Duration::hours(1), now).await.unwrap();

        let claimed = claim_token(&mut conn, "tok").await.unwrap().unwrap();
        assert!(claimed.is_used);
        assert_eq!(claimed.user_id, user.id);
        assert!(claim_token(&mut conn, "tok").await.unwrap().is_none());
        assert!(claim_token(&mut conn, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retire_marks_only_unused_tokens_of_user() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let mut conn = pool.acquire().await.unwrap();
        let a = insert_user(&mut conn, &NewUser::member(&scope, Role::Teacher, "A", "a@a.io", None).unwrap())
            .await
            .unwrap();
        let b = insert_user(&mut conn, &NewUser::member(&scope, Role::Teacher, "B", "b@a.io", None).unwrap())
            .await
            .unwrap();

        let now = Utc::now();
        let later = now + Duration::hours(1);
        insert_token(&mut conn, a.id, "a1", later, now).await.unwrap();
        insert_token(&mut conn, a.id, "a2", later, now).await.unwrap();
        insert_token(&mut conn, b.id, "b1", later, now).await.unwrap();

        assert_eq!(retire_unused_tokens(&mut conn, a.id).await.unwrap(), 2);
        assert!(find_by_token(&mut conn, "a1").await.unwrap().unwrap().is_used);
        assert!(!find_by_token(&mut conn, "b1").await.unwrap().unwrap().is_used);
    }
}
