//! Student/parent guardianship links.
//!
//! A link is only visible through a [`TenantScope`] whose school owns both
//! ends. Every statement joins the two user rows and filters each on the
//! scope's school id, so a link that touches another school looks absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};
use tracing::instrument;

use crate::auth::models::{Role, TenantScope};
use crate::domain::UserId;
use crate::errors::types::is_unique_violation;
use crate::errors::{Result, SchoolError};
use crate::storage::DbPool;

pub const DEFAULT_RELATIONSHIP: &str = "Parent";

const LINK_SELECT: &str = r#"
    SELECT l.id, l.student_id, l.parent_id, l.relationship_type, l.created_at,
           s.name AS student_name, s.email AS student_email,
           p.name AS parent_name, p.email AS parent_email
    FROM student_parents l
    JOIN users s ON s.id = l.student_id
    JOIN users p ON p.id = l.parent_id
    WHERE s.school_id = ? AND p.school_id = ?
"#;

#[derive(Debug, Clone, FromRow)]
struct LinkRow {
    id: i64,
    student_id: i64,
    parent_id: i64,
    relationship_type: String,
    created_at: DateTime<Utc>,
    student_name: String,
    student_email: String,
    parent_name: String,
    parent_email: String,
}

/// A link together with the names and emails of both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentParentLink {
    pub id: i64,
    pub student_id: UserId,
    pub parent_id: UserId,
    pub relationship_type: String,
    pub student_name: String,
    pub student_email: String,
    pub parent_name: String,
    pub parent_email: String,
    pub created_at: DateTime<Utc>,
}

impl From<LinkRow> for StudentParentLink {
    fn from(row: LinkRow) -> Self {
        Self {
            id: row.id,
            student_id: UserId::new(row.student_id),
            parent_id: UserId::new(row.parent_id),
            relationship_type: row.relationship_type,
            student_name: row.student_name,
            student_email: row.student_email,
            parent_name: row.parent_name,
            parent_email: row.parent_email,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
pub trait StudentParentRepository: Send + Sync {
    /// Link an active student and parent of the scoped school.
    ///
    /// Fails with `NotFound` naming whichever end is not a member of the
    /// school, and with `Conflict` when the pair is already linked.
    async fn create_link(
        &self,
        scope: &TenantScope,
        student_id: UserId,
        parent_id: UserId,
        relationship_type: &str,
    ) -> Result<StudentParentLink>;

    /// False when no link with that id has both ends in the scoped school
    async fn delete_link(&self, scope: &TenantScope, link_id: i64) -> Result<bool>;

    /// `None` when the student is not an active member of the scoped school
    async fn parents_of(
        &self,
        scope: &TenantScope,
        student_id: UserId,
    ) -> Result<Option<Vec<StudentParentLink>>>;

    /// `None` when the parent is not an active member of the scoped school
    async fn students_of(
        &self,
        scope: &TenantScope,
        parent_id: UserId,
    ) -> Result<Option<Vec<StudentParentLink>>>;
}

#[derive(Debug, Clone)]
pub struct SqlxStudentParentRepository {
    pool: DbPool,
}

impl SqlxStudentParentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn is_member(&self, scope: &TenantScope, id: UserId, role: Role) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM users WHERE id = ? AND school_id = ? AND role = ? AND is_active = 1",
        )
        .bind(id)
        .bind(scope.school_id())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to check school member"))?;

        Ok(found.is_some())
    }

    async fn fetch_links(
        &self,
        scope: &TenantScope,
        filter: &str,
        id: UserId,
    ) -> Result<Vec<StudentParentLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!("{} AND {} = ? ORDER BY l.id", LINK_SELECT, filter))
            .bind(scope.school_id())
            .bind(scope.school_id())
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchoolError::database(e, "Failed to list student parent links"))?;

        Ok(rows.into_iter().map(StudentParentLink::from).collect())
    }
}

#[async_trait]
impl StudentParentRepository for SqlxStudentParentRepository {
    #[instrument(
        skip(self, scope, relationship_type),
        fields(school_id = %scope.school_id(), student_id = %student_id, parent_id = %parent_id),
        name = "db_create_student_parent_link"
    )]
    async fn create_link(
        &self,
        scope: &TenantScope,
        student_id: UserId,
        parent_id: UserId,
        relationship_type: &str,
    ) -> Result<StudentParentLink> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO student_parents (student_id, parent_id, relationship_type, created_at)
            SELECT s.id, p.id, ?, ?
            FROM users s, users p
            WHERE s.id = ? AND s.school_id = ? AND s.role = 'STUDENT' AND s.is_active = 1
              AND p.id = ? AND p.school_id = ? AND p.role = 'PARENT' AND p.is_active = 1
            RETURNING id
            "#,
        )
        .bind(relationship_type)
        .bind(Utc::now())
        .bind(student_id)
        .bind(scope.school_id())
        .bind(parent_id)
        .bind(scope.school_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchoolError::conflict(
                    "Link between this parent and student already exists",
                    "student_parent",
                )
            } else {
                SchoolError::database(e, "Failed to create student parent link")
            }
        })?;

        let Some(link_id) = inserted else {
            if !self.is_member(scope, student_id, Role::Student).await? {
                return Err(SchoolError::not_found("Student", student_id.to_string()));
            }
            return Err(SchoolError::not_found("Parent", parent_id.to_string()));
        };

        let row = sqlx::query_as::<_, LinkRow>(&format!("{} AND l.id = ?", LINK_SELECT))
            .bind(scope.school_id())
            .bind(scope.school_id())
            .bind(link_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SchoolError::database(e, "Failed to fetch student parent link"))?;

        Ok(row.into())
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id()), name = "db_delete_student_parent_link")]
    async fn delete_link(&self, scope: &TenantScope, link_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM student_parents
            WHERE id = ?
              AND student_id IN (SELECT id FROM users WHERE school_id = ?)
              AND parent_id IN (SELECT id FROM users WHERE school_id = ?)
            "#,
        )
        .bind(link_id)
        .bind(scope.school_id())
        .bind(scope.school_id())
        .execute(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to delete student parent link"))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id(), student_id = %student_id), name = "db_parents_of")]
    async fn parents_of(
        &self,
        scope: &TenantScope,
        student_id: UserId,
    ) -> Result<Option<Vec<StudentParentLink>>> {
        if !self.is_member(scope, student_id, Role::Student).await? {
            return Ok(None);
        }
        self.fetch_links(scope, "l.student_id", student_id).await.map(Some)
    }

    #[instrument(skip(self, scope), fields(school_id = %scope.school_id(), parent_id = %parent_id), name = "db_students_of")]
    async fn students_of(
        &self,
        scope: &TenantScope,
        parent_id: UserId,
    ) -> Result<Option<Vec<StudentParentLink>>> {
        if !self.is_member(scope, parent_id, Role::Parent).await? {
            return Ok(None);
        }
        self.fetch_links(scope, "l.parent_id", parent_id).await.map(Some)
    }
}

/// Link a freshly created student to the active parent of the scoped school
/// that owns `parent_email`. False when the school has no such parent.
#[instrument(skip(conn, scope, parent_email), fields(school_id = %scope.school_id(), student_id = %student_id), name = "db_link_parent_by_email")]
pub async fn link_parent_by_email(
    conn: &mut SqliteConnection,
    scope: &TenantScope,
    student_id: UserId,
    parent_email: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO student_parents (student_id, parent_id, relationship_type, created_at)
        SELECT ?, p.id, ?, ?
        FROM users p
        WHERE p.email = ? AND p.school_id = ? AND p.role = 'PARENT' AND p.is_active = 1
        "#,
    )
    .bind(student_id)
    .bind(DEFAULT_RELATIONSHIP)
    .bind(Utc::now())
    .bind(parent_email)
    .bind(scope.school_id())
    .execute(&mut *conn)
    .await
    .map_err(|e| SchoolError::database(e, "Failed to link parent by email"))?;

    Ok(result.rows_affected() == 1)
}
