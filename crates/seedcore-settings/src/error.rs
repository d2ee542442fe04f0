use thiserror::Error;

/// Failure modes surfaced by the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The database file could not be opened or created.
    #[error("failed to open settings database at {path}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying `sqlx` failure.
        #[source]
        source: sqlx::Error,
    },
    /// A query against the settings database failed.
    #[error("settings query '{operation}' failed")]
    Query {
        /// Operation identifier, for log correlation.
        operation: &'static str,
        /// Underlying `sqlx` failure.
        #[source]
        source: sqlx::Error,
    },
    /// A stored value could not be decoded as JSON.
    #[error("settings value for key '{key}' is corrupt")]
    CorruptValue {
        /// Key whose value failed to decode.
        key: String,
        /// Decode failure detail.
        reason: String,
    },
    /// A category name was empty or otherwise invalid.
    #[error("invalid category name")]
    InvalidCategory,
}

/// Convenience alias for settings-store results.
pub type SettingsResult<T> = Result<T, SettingsError>;
