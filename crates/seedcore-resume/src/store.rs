use std::path::Path;

use seedcore_events::InfoHash;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::ResumeError;
use crate::migrations;
use crate::row::ResumeRow;

/// Durable per-torrent resume state, keyed by info-hash.
///
/// Owned exclusively by the session controller loop; the spec's
/// single-database-handle rule means no other caller should open the same
/// file concurrently for writes.
#[derive(Clone)]
pub struct ResumeStore {
    pool: SqlitePool,
}

impl ResumeStore {
    /// Open (creating if absent) the resume database at `path`, migrating
    /// its schema to the current version.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Open`] if the file cannot be opened or created,
    /// or a migration error if the schema cannot be brought current.
    pub async fn open(path: &Path) -> Result<Self, ResumeError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| ResumeError::Open { path: path.display().to_string(), source })?;

        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// Load every row currently in the store.
    ///
    /// Rows that fail to decode are logged and skipped rather than aborting
    /// the whole load, per the store's storage-corruption policy.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying query itself fails.
    pub async fn load_all(&self) -> Result<Vec<ResumeRow>, ResumeError> {
        let records = sqlx::query(
            "SELECT info_hash, resume_blob, name, category, tags, added_time, save_path, dl_limit, ul_limit
             FROM resume_data",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| ResumeError::Query { operation: "load_all", source })?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let raw_hash: String = record.get("info_hash");
            match decode_row(&record, &raw_hash) {
                Ok(row) => rows.push(row),
                Err(reason) => {
                    warn!(info_hash = %raw_hash, %reason, "skipping corrupt resume row");
                }
            }
        }
        Ok(rows)
    }

    /// Insert or replace the row for `row.info_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Callers are expected to log and
    /// skip such failures rather than treat them as fatal (see the store's
    /// failure mode).
    pub async fn upsert(&self, row: &ResumeRow) -> Result<(), ResumeError> {
        let tags = serde_json::to_string(&row.tags)
            .map_err(|err| ResumeError::CorruptRow { info_hash: row.info_hash, reason: err.to_string() })?;
        let dl_limit = i64::try_from(row.dl_limit).unwrap_or(i64::MAX);
        let ul_limit = i64::try_from(row.ul_limit).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO resume_data (info_hash, resume_blob, name, category, tags, added_time, save_path, dl_limit, ul_limit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(info_hash) DO UPDATE SET
                resume_blob = excluded.resume_blob,
                name = excluded.name,
                category = excluded.category,
                tags = excluded.tags,
                added_time = excluded.added_time,
                save_path = excluded.save_path,
                dl_limit = excluded.dl_limit,
                ul_limit = excluded.ul_limit",
        )
        .bind(row.info_hash.to_string())
        .bind(&row.resume_blob)
        .bind(&row.name)
        .bind(&row.category)
        .bind(tags)
        .bind(row.added_time)
        .bind(&row.save_path)
        .bind(dl_limit)
        .bind(ul_limit)
        .execute(&self.pool)
        .await
        .map_err(|source| ResumeError::Query { operation: "upsert", source })?;

        Ok(())
    }

    /// Delete the row for `info_hash`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete itself fails; deleting an absent row
    /// is a no-op, not an error.
    pub async fn delete(&self, info_hash: InfoHash) -> Result<(), ResumeError> {
        sqlx::query("DELETE FROM resume_data WHERE info_hash = ?1")
            .bind(info_hash.to_string())
            .execute(&self.pool)
            .await
            .map_err(|source| ResumeError::Query { operation: "delete", source })?;
        Ok(())
    }
}

fn decode_row(record: &sqlx::sqlite::SqliteRow, raw_hash: &str) -> Result<ResumeRow, String> {
    let info_hash = InfoHash::parse(raw_hash).map_err(|err| err.to_string())?;
    let tags_json: String = record.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|err| err.to_string())?;
    let dl_limit: i64 = record.get("dl_limit");
    let ul_limit: i64 = record.get("ul_limit");

    Ok(ResumeRow {
        info_hash,
        resume_blob: record.get("resume_blob"),
        name: record.get("name"),
        category: record.get("category"),
        tags,
        added_time: record.get("added_time"),
        save_path: record.get("save_path"),
        dl_limit: u64::try_from(dl_limit).unwrap_or(0),
        ul_limit: u64::try_from(ul_limit).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_row(seed: u8) -> ResumeRow {
        let hex: String = [seed; 20].iter().map(|b| format!("{b:02x}")).collect();
        ResumeRow {
            info_hash: InfoHash::parse(&hex).unwrap(),
            resume_blob: vec![1, 2, 3],
            name: "demo".to_string(),
            category: "Movies".to_string(),
            tags: vec!["hd".to_string()],
            added_time: 1_700_000_000,
            save_path: "/tmp/x".to_string(),
            dl_limit: 0,
            ul_limit: 0,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::open(&dir.path().join("resume.db")).await.unwrap();

        let row = sample_row(0xab);
        store.upsert(&row).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], row);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_replace() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::open(&dir.path().join("resume.db")).await.unwrap();

        let mut row = sample_row(0x01);
        store.upsert(&row).await.unwrap();
        row.category = "TV".to_string();
        store.upsert(&row).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].category, "TV");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::open(&dir.path().join("resume.db")).await.unwrap();

        let row = sample_row(0x02);
        store.upsert(&row).await.unwrap();
        store.delete(row.info_hash).await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_hash_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::open(&dir.path().join("resume.db")).await.unwrap();
        let hex: String = [0x09_u8; 20].iter().map(|b| format!("{b:02x}")).collect();
        store.delete(InfoHash::parse(&hex).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn reopening_existing_store_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resume.db");
        {
            let store = ResumeStore::open(&path).await.unwrap();
            store.upsert(&sample_row(0x03)).await.unwrap();
        }
        let store = ResumeStore::open(&path).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
