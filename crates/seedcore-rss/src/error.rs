/// Errors raised by the RSS ingester.
#[derive(Debug, thiserror::Error)]
pub enum RssError {
    /// The feed could not be fetched within the hard timeout.
    #[error("failed to fetch feed {url}")]
    Fetch {
        /// Feed URL that failed.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The feed body could not be parsed as RSS 2.0 or Atom 1.0.
    #[error("failed to parse feed {url}: {reason}")]
    Parse {
        /// Feed URL whose body failed to parse.
        url: String,
        /// Human-readable parse failure detail.
        reason: String,
    },
    /// The seen-items history store could not be opened or created.
    #[error("failed to open feed history store at {path}")]
    HistoryOpen {
        /// Path that failed to open.
        path: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
    /// A query against the seen-items history store failed.
    #[error("feed history operation '{operation}' failed")]
    HistoryQuery {
        /// Name of the operation that failed.
        operation: &'static str,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
    /// The shared HTTP client could not be constructed.
    #[error("failed to construct the feed fetch client")]
    ClientBuild(#[source] reqwest::Error),
}
