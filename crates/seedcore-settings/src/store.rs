use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::category::Category;
use crate::defaults::declared_default;
use crate::error::{SettingsError, SettingsResult};

/// Persistent key/value configuration plus the category and tag lists.
///
/// Read-mostly: the session controller takes a snapshot at `Initialize` and
/// re-snapshots on `ApplySettings`; nothing else should hold a writable
/// handle once the controller has started (see the store's ownership rule).
#[derive(Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    /// Open (creating if absent) the settings database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Open`] if the file cannot be opened or
    /// created, or if the schema cannot be initialized.
    pub async fn open(path: &Path) -> SettingsResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| SettingsError::Open {
                path: path.display().to_string(),
                source,
            })?;

        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Read `key`, falling back to its declared default, or `None` if the
    /// key is neither present nor declared.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored value is corrupt.
    pub async fn get(&self, key: &str) -> SettingsResult<Option<Value>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "get", source })?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                let value = serde_json::from_str(&raw).map_err(|err| SettingsError::CorruptValue {
                    key: key.to_string(),
                    reason: err.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(declared_default(key)),
        }
    }

    /// Write `value` for `key`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn set(&self, key: &str, value: &Value) -> SettingsResult<()> {
        let raw = serde_json::to_string(value).map_err(|err| SettingsError::CorruptValue {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(|source| SettingsError::Query { operation: "set", source })?;
        Ok(())
    }

    /// Read every stored key, merged with every declared default not
    /// already present in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored value is corrupt.
    pub async fn get_all(&self) -> SettingsResult<BTreeMap<String, Value>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "get_all", source })?;

        let mut all = BTreeMap::new();
        for key in crate::defaults::DECLARED_KEYS {
            if let Some(default) = declared_default(key) {
                all.insert((*key).to_string(), default);
            }
        }
        for row in rows {
            let key: String = row.get("key");
            let raw: String = row.get("value");
            let value = serde_json::from_str(&raw).map_err(|err| SettingsError::CorruptValue {
                key: key.clone(),
                reason: err.to_string(),
            })?;
            all.insert(key, value);
        }
        Ok(all)
    }

    /// List categories in lexicographic order by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_categories(&self) -> SettingsResult<Vec<Category>> {
        let rows = sqlx::query("SELECT name, save_path, color FROM categories ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "get_categories", source })?;
        Ok(rows
            .into_iter()
            .map(|row| Category {
                name: row.get("name"),
                save_path: row.get("save_path"),
                color: row.get("color"),
            })
            .collect())
    }

    /// Insert or replace a category by name.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidCategory`] if `name` is empty, or a
    /// query error if the write fails.
    pub async fn add_category(&self, name: &str, save_path: &str, color: &str) -> SettingsResult<()> {
        if name.is_empty() {
            return Err(SettingsError::InvalidCategory);
        }
        sqlx::query(
            "INSERT INTO categories (name, save_path, color) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET save_path = excluded.save_path, color = excluded.color",
        )
        .bind(name)
        .bind(save_path)
        .bind(color)
        .execute(&self.pool)
        .await
        .map_err(|source| SettingsError::Query { operation: "add_category", source })?;
        Ok(())
    }

    /// Remove a category by name. Removing an unknown category is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete itself fails.
    pub async fn remove_category(&self, name: &str) -> SettingsResult<()> {
        sqlx::query("DELETE FROM categories WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "remove_category", source })?;
        Ok(())
    }

    /// List tags in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_tags(&self) -> SettingsResult<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "get_tags", source })?;
        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    /// Insert a tag if absent. Inserting an existing tag is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn add_tag(&self, name: &str) -> SettingsResult<()> {
        sqlx::query("INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "add_tag", source })?;
        Ok(())
    }

    /// Remove a tag by name. Removing an unknown tag is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete itself fails.
    pub async fn remove_tag(&self, name: &str) -> SettingsResult<()> {
        sqlx::query("DELETE FROM tags WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|source| SettingsError::Query { operation: "remove_tag", source })?;
        Ok(())
    }
}

async fn create_schema(pool: &SqlitePool) -> SettingsResult<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
        .execute(pool)
        .await
        .map_err(|source| SettingsError::Query { operation: "create_schema.settings", source })?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS categories (
            name TEXT PRIMARY KEY,
            save_path TEXT NOT NULL,
            color TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|source| SettingsError::Query { operation: "create_schema.categories", source })?;
    sqlx::query("CREATE TABLE IF NOT EXISTS tags (name TEXT PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(|source| SettingsError::Query { operation: "create_schema.tags", source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, Settings) {
        let dir = TempDir::new().unwrap();
        let store = Settings::open(&dir.path().join("settings.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn get_falls_back_to_declared_default() {
        let (_dir, store) = open_store().await;
        assert_eq!(store.get("listen_port").await.unwrap(), Some(json!(6881)));
    }

    #[tokio::test]
    async fn get_of_unknown_key_is_none() {
        let (_dir, store) = open_store().await;
        assert_eq!(store.get("not_a_real_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_dir, store) = open_store().await;
        store.set("listen_port", &json!(12345)).await.unwrap();
        assert_eq!(store.get("listen_port").await.unwrap(), Some(json!(12345)));
    }

    #[tokio::test]
    async fn get_all_merges_stored_and_declared() {
        let (_dir, store) = open_store().await;
        store.set("listen_port", &json!(9999)).await.unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.get("listen_port"), Some(&json!(9999)));
        assert_eq!(all.get("max_upload_speed"), Some(&json!(13312)));
    }

    #[tokio::test]
    async fn categories_round_trip_in_lexicographic_order() {
        let (_dir, store) = open_store().await;
        store.add_category("Television", "/tmp/tv", "#00f").await.unwrap();
        store.add_category("Anime", "/tmp/anime", "#f00").await.unwrap();
        let categories = store.get_categories().await.unwrap();
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Anime", "Television"]);
    }

    #[tokio::test]
    async fn add_category_rejects_empty_name() {
        let (_dir, store) = open_store().await;
        assert!(matches!(
            store.add_category("", "/tmp", "").await,
            Err(SettingsError::InvalidCategory)
        ));
    }

    #[tokio::test]
    async fn remove_category_of_unknown_name_is_a_no_op() {
        let (_dir, store) = open_store().await;
        store.remove_category("missing").await.unwrap();
    }

    #[tokio::test]
    async fn tags_round_trip_and_double_add_is_idempotent() {
        let (_dir, store) = open_store().await;
        store.add_tag("hd").await.unwrap();
        store.add_tag("hd").await.unwrap();
        assert_eq!(store.get_tags().await.unwrap(), vec!["hd".to_string()]);
        store.remove_tag("hd").await.unwrap();
        assert!(store.get_tags().await.unwrap().is_empty());
    }
}
