//! School (tenant) repository. Only the platform super admin reaches these.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::{NewSchool, School, SchoolId};
use crate::errors::{Result, SchoolError};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
struct SchoolRow {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SchoolRow> for School {
    fn from(row: SchoolRow) -> Self {
        School {
            id: SchoolId::new(row.id),
            name: row.name,
            address: row.address,
            phone: row.phone,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
pub trait SchoolRepository: Send + Sync {
    async fn create_school(&self, school: &NewSchool) -> Result<School>;

    async fn get_school(&self, id: SchoolId) -> Result<Option<School>>;

    async fn list_schools(&self) -> Result<Vec<School>>;
}

#[derive(Debug, Clone)]
pub struct SqlxSchoolRepository {
    pool: DbPool,
}

impl SqlxSchoolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchoolRepository for SqlxSchoolRepository {
    #[instrument(skip(self, school), fields(name = %school.name), name = "db_create_school")]
    async fn create_school(&self, school: &NewSchool) -> Result<School> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, SchoolRow>(
            r#"
            INSERT INTO schools (name, address, phone, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, name, address, phone, email, created_at, updated_at
            "#,
        )
        .bind(&school.name)
        .bind(school.address.as_deref())
        .bind(school.phone.as_deref())
        .bind(school.email.as_deref())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to create school"))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(school_id = %id), name = "db_get_school")]
    async fn get_school(&self, id: SchoolId) -> Result<Option<School>> {
        let row = sqlx::query_as::<_, SchoolRow>(
            "SELECT id, name, address, phone, email, created_at, updated_at FROM schools WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to fetch school"))?;

        Ok(row.map(School::from))
    }

    #[instrument(skip(self), name = "db_list_schools")]
    async fn list_schools(&self) -> Result<Vec<School>> {
        let rows = sqlx::query_as::<_, SchoolRow>(
            "SELECT id, name, address, phone, email, created_at, updated_at FROM schools ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchoolError::database(e, "Failed to list schools"))?;

        Ok(rows.into_iter().map(School::from).collect())
    }
}
