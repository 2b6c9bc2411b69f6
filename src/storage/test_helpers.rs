//! Test database utilities for in-library tests.
//!
//! Every pool is a private in-memory SQLite database. A single connection that
//! never idles out keeps the database alive for the lifetime of the pool.

use crate::domain::SchoolId;
use crate::storage::{run_migrations, DbPool};
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;

/// Fresh in-memory pool without any schema.
pub async fn memory_pool() -> DbPool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool")
}

/// Fresh in-memory pool with every migration applied.
pub async fn migrated_pool() -> DbPool {
    let pool = memory_pool().await;
    run_migrations(&pool).await.expect("migrations apply");
    pool
}

/// Insert a school row directly and return its id.
pub async fn insert_school(pool: &DbPool, name: &str) -> SchoolId {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO schools (name, created_at, updated_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .expect("insert school");
    SchoolId::new(id)
}
