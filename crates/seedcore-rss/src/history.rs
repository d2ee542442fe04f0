use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::RssError;

/// How long a seen-item record is kept before it's eligible for cleanup.
/// An item is only ever re-announced by a misbehaving feed; 90 days gives
/// ample margin before the row is reclaimed.
const RETENTION_DAYS: i64 = 90;

/// Durable record of which feed items have already been processed, so a
/// restart doesn't re-download everything a feed has ever published.
#[derive(Clone)]
pub struct FeedHistory {
    pool: SqlitePool,
}

impl FeedHistory {
    /// Open (creating if absent) the feed history database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RssError::HistoryOpen`] if the file cannot be opened or
    /// created, or the schema cannot be created.
    pub async fn open(path: &Path) -> Result<Self, RssError> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| RssError::HistoryOpen { path: path.display().to_string(), source })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS seen_items (
                item_id TEXT PRIMARY KEY,
                feed_url TEXT NOT NULL,
                title TEXT NOT NULL,
                seen_time INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|source| RssError::HistoryQuery { operation: "create_table", source })?;

        Ok(Self { pool })
    }

    /// Whether `item_id` has already been recorded as seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn has_seen(&self, item_id: &str) -> Result<bool, RssError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT item_id FROM seen_items WHERE item_id = ?1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| RssError::HistoryQuery { operation: "has_seen", source })?;
        Ok(row.is_some())
    }

    /// Record `item_id` as seen. Marking an already-seen item again is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    pub async fn mark_seen(&self, item_id: &str, feed_url: &str, title: &str, seen_time: i64) -> Result<(), RssError> {
        sqlx::query(
            "INSERT INTO seen_items (item_id, feed_url, title, seen_time) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_id) DO NOTHING",
        )
        .bind(item_id)
        .bind(feed_url)
        .bind(title)
        .bind(seen_time)
        .execute(&self.pool)
        .await
        .map_err(|source| RssError::HistoryQuery { operation: "mark_seen", source })?;
        Ok(())
    }

    /// Purge seen-item rows older than [`RETENTION_DAYS`] relative to
    /// `now`, returning how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying delete fails.
    pub async fn purge_older_than(&self, now: i64) -> Result<u64, RssError> {
        let cutoff = now - RETENTION_DAYS * 24 * 60 * 60;
        let result = sqlx::query("DELETE FROM seen_items WHERE seen_time < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|source| RssError::HistoryQuery { operation: "purge_older_than", source })?;
        Ok(result.rows_affected())
    }

    /// Close the underlying connection pool. Called once on ingester
    /// shutdown; the store is unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unseen_item_is_reported_unseen() {
        let dir = TempDir::new().unwrap();
        let history = FeedHistory::open(&dir.path().join("rss_history.db")).await.unwrap();
        assert!(!history.has_seen("item-1").await.unwrap());
    }

    #[tokio::test]
    async fn marking_seen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let history = FeedHistory::open(&dir.path().join("rss_history.db")).await.unwrap();
        history.mark_seen("item-1", "https://example.com/feed", "Title", 1_700_000_000).await.unwrap();
        history.mark_seen("item-1", "https://example.com/feed", "Title", 1_700_000_000).await.unwrap();
        assert!(history.has_seen("item-1").await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_only_stale_rows() {
        let dir = TempDir::new().unwrap();
        let history = FeedHistory::open(&dir.path().join("rss_history.db")).await.unwrap();
        let now = 1_700_000_000_i64;
        history.mark_seen("old", "u", "t", now - 91 * 24 * 60 * 60).await.unwrap();
        history.mark_seen("fresh", "u", "t", now).await.unwrap();

        let purged = history.purge_older_than(now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(!history.has_seen("old").await.unwrap());
        assert!(history.has_seen("fresh").await.unwrap());
    }
}
