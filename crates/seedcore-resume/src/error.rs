use seedcore_events::InfoHash;

/// Errors raised by the resume store.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// The store's file could not be opened or created.
    #[error("failed to open resume store at {path}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
    /// A schema migration step failed.
    #[error("resume store migration to v{target_version} failed")]
    Migration {
        /// Schema version the migration was moving to.
        target_version: i64,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
    /// A row could not be read back or decoded (storage corruption).
    #[error("resume row for {info_hash} is corrupt: {reason}")]
    CorruptRow {
        /// Torrent identity the row belongs to.
        info_hash: InfoHash,
        /// Human-readable decode failure detail.
        reason: String,
    },
    /// A query failed against an otherwise healthy database.
    #[error("resume store operation '{operation}' failed")]
    Query {
        /// Name of the operation that failed.
        operation: &'static str,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
}
