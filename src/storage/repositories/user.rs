//! User repository.
//!
//! Credential lookups are global (login happens before a tenant is known).
//! Everything else that touches school members takes a [`TenantScope`] and
//! filters on its school id, so rows from another school look absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::instrument;

use crate::auth::models::{Role, TenantScope};
use crate::auth::user::{NewUser, UpdateMemberRequest, User, UserCredentials};
use crate::domain::{SchoolId, UserId};
use crate::errors::types::is_unique_violation;
use crate::errors::{Result, SchoolError};
use crate::storage::DbPool;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, school_id, subject, is_active, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub school_id: Option<i64>,
    pub subject: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserCredentials {
    type Error = SchoolError;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| SchoolError::internal(format!("Unknown role '{}' in users table", row.role)))?;

        let user = User {
            id: UserId::new(row.id),
            name: row.name,
            email: row.email,
            role,
            school_id: row.school_id.map(SchoolId::new),
            subject: row.subject,
            is_active: row.is_active,
            has_password: row.password_hash.is_some(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        };

        Ok(UserCredentials { user, password_hash: row.password_hash })
    }
}

fn row_to_user(row: UserRow) -> Result<User> {
    UserCredentials::try_from(row).map(|creds| creds.user)
}

fn map_write_error(err: sqlx::Error, context: &str) -> SchoolError {
    if is_unique_violation(&err) {
        SchoolError::conflict("Email already exists", "user")
    } else {
        SchoolError::database(err, context)
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Active member counts of one school.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MemberCounts {
    pub total_teachers: i64,
    pub total_students: i64,
    pub total_parents: i64,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Exact, case-sensitive email lookup including the stored hash
    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>>;

    /// Fetch any account by id, regardless of school
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// The platform super admin, if one has been bootstrapped
    async fn find_super_admin(&self) -> Result<Option<User>>;

    /// Active member of the scoped school, optionally restricted to a role
    async fn get_member(
        &self,
        scope: &TenantScope,
        id: UserId,
        role: Option<Role>,
    ) -> Result<Option<User>>;

    /// Active members of the scoped school with the given role
    async fn list_members(
        &self,
        scope: &TenantScope,
        role: Role,
        search: Option<&str>,
    ) -> Result<Vec<User>>;

    /// Active teacher/student/parent counts for the scoped school
    async fn count_members(&self, scope: &TenantScope) -> Result<MemberCounts>;

    /// Apply a partial update; `None` when no such active member exists in the school
    async fn update_member(
        &self,
        scope: &TenantScope,
        id: UserId,
        role: Role,
        update: &UpdateMemberRequest,
    ) -> Result<Option<User>>;

    /// Soft delete; false when no such active member exists in the school
    async fn deactivate_member(&self, scope: &TenantScope, id: UserId, role: Role) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    #[instrument(skip(self, email), name = "db_find_credentials")]
    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to fetch user by email"))?;

        row.map(UserCredentials::try_from).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_get_user")]
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row =
            sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SchoolError::database(e, "Failed to fetch user"))?;

        row.map(row_to_user).transpose()
    }

    #[instrument(skip(self), name = "db_find_super_admin")]
    async fn find_super_admin(&self) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE role = 'SUPER_ADMIN'",
            USER_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to fetch super admin"))?;

        row.map(row_to_user).transpose()
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id(), user_id = %id), name = "db_get_member")]
    async fn get_member(
        &self,
        scope: &TenantScope,
        id: UserId,
        role: Option<Role>,
    ) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ? AND school_id = ? AND is_active = 1 AND (? IS NULL OR role = ?)",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(scope.school_id())
        .bind(role.map(|r| r.as_str()))
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to fetch school member"))?;

        row.map(row_to_user).transpose()
    }

    #[instrument(skip(self, scope, search), fields(school_id = %scope.school_id(), role = %role), name = "db_list_members")]
    async fn list_members(
        &self,
        scope: &TenantScope,
        role: Role,
        search: Option<&str>,
    ) -> Result<Vec<User>> {
        let pattern = search.map(str::trim).filter(|s| !s.is_empty()).map(like_pattern);

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {} FROM users
            WHERE school_id = ? AND role = ? AND is_active = 1
              AND (? IS NULL OR name LIKE ? ESCAPE '\' OR email LIKE ? ESCAPE '\')
            ORDER BY name, id
            "#,
            USER_COLUMNS
        ))
        .bind(scope.school_id())
        .bind(role.as_str())
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to list school members"))?;

        rows.into_iter().map(row_to_user).collect()
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id()), name = "db_count_members")]
    async fn count_members(&self, scope: &TenantScope) -> Result<MemberCounts> {
        let (total_teachers, total_students, total_parents): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN role = 'TEACHER' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN role = 'STUDENT' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN role = 'PARENT' THEN 1 ELSE 0 END), 0)
            FROM users
            WHERE school_id = ? AND is_active = 1
            "#,
        )
        .bind(scope.school_id())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to count school members"))?;

        Ok(MemberCounts { total_teachers, total_students, total_parents })
    }

    #[instrument(skip(self, scope, update), fields(school_id = %scope.school_id(), user_id = %id), name = "db_update_member")]
    async fn update_member(
        &self,
        scope: &TenantScope,
        id: UserId,
        role: Role,
        update: &UpdateMemberRequest,
    ) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                subject = COALESCE(?, subject),
                updated_at = ?
            WHERE id = ? AND school_id = ? AND role = ? AND is_active = 1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.subject.as_deref())
        .bind(Utc::now())
        .bind(id)
        .bind(scope.school_id())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to update school member"))?;

        row.map(row_to_user).transpose()
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id(), user_id = %id), name = "db_deactivate_member")]
    async fn deactivate_member(&self, scope: &TenantScope, id: UserId, role: Role) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_active = 0, updated_at = ? WHERE id = ? AND school_id = ? AND role = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(scope.school_id())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to deactivate school member"))?;

        Ok(result.rows_affected() == 1)
    }
}

/// Insert an account inside the caller's transaction.
#[instrument(skip(conn, user), fields(role = %user.role()), name = "db_insert_user")]
pub async fn insert_user(conn: &mut SqliteConnection, user: &NewUser) -> Result<User> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (name, email, password_hash, role, school_id, subject, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(user.name())
    .bind(user.email())
    .bind(user.password_hash())
    .bind(user.role().as_str())
    .bind(user.school_id())
    .bind(user.subject())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, "Failed to create user"))?;

    row_to_user(row)
}

/// Replace the password hash of an active account. False when the account is
/// missing or deactivated.
#[instrument(skip(conn, password_hash), fields(user_id = %id), name = "db_set_password_hash")]
pub async fn set_password_hash(
    conn: &mut SqliteConnection,
    id: UserId,
    password_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(password_hash)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| SchoolError::database(e, "Failed to update password hash"))?;

    Ok(result.rows_affected() == 1)
}
