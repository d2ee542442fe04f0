use sqlx::SqlitePool;
use tracing::debug;

use crate::error::ResumeError;

/// Current schema version this build expects to run against.
pub(crate) const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Open (or create) the resume store and bring its schema up to
/// [`CURRENT_SCHEMA_VERSION`]. Migrations are additive and idempotent: an
/// already-current database is a no-op, and a database left by an older
/// build is upgraded in place without touching existing rows.
pub(crate) async fn run(pool: &SqlitePool) -> Result<(), ResumeError> {
    let mut version = read_version(pool).await?;

    if version < 1 {
        apply_v1(pool).await?;
        version = 1;
    }
    if version < 2 {
        apply_v2(pool).await?;
        version = 2;
    }

    write_version(pool, version).await
}

async fn read_version(pool: &SqlitePool) -> Result<i64, ResumeError> {
    let table_exists: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
    )
    .fetch_optional(pool)
    .await
    .map_err(|source| ResumeError::Migration { target_version: CURRENT_SCHEMA_VERSION, source })?;

    if table_exists.is_none() {
        return Ok(0);
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version WHERE id = 1")
        .fetch_optional(pool)
        .await
        .map_err(|source| ResumeError::Migration { target_version: CURRENT_SCHEMA_VERSION, source })?;

    Ok(row.map_or(0, |(version,)| version))
}

async fn write_version(pool: &SqlitePool, version: i64) -> Result<(), ResumeError> {
    sqlx::query(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
    )
    .bind(version)
    .execute(pool)
    .await
    .map_err(|source| ResumeError::Migration { target_version: version, source })?;
    Ok(())
}

async fn apply_v1(pool: &SqlitePool) -> Result<(), ResumeError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|source| ResumeError::Migration { target_version: 1, source })?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS resume_data (
            info_hash TEXT PRIMARY KEY,
            resume_blob BLOB NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            tags TEXT NOT NULL,
            added_time INTEGER NOT NULL,
            save_path TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|source| ResumeError::Migration { target_version: 1, source })?;

    debug!("resume store migrated to v1");
    Ok(())
}

async fn apply_v2(pool: &SqlitePool) -> Result<(), ResumeError> {
    add_column_idempotent(pool, "ALTER TABLE resume_data ADD COLUMN dl_limit INTEGER NOT NULL DEFAULT 0").await?;
    add_column_idempotent(pool, "ALTER TABLE resume_data ADD COLUMN ul_limit INTEGER NOT NULL DEFAULT 0").await?;
    debug!("resume store migrated to v2");
    Ok(())
}

async fn add_column_idempotent(pool: &SqlitePool, statement: &str) -> Result<(), ResumeError> {
    match sqlx::query(statement).execute(pool).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column name") => {
            Ok(())
        }
        Err(source) => Err(ResumeError::Migration { target_version: 2, source }),
    }
}
