use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application bootstrap operations.
pub type AppResult<T> = Result<T, AppError>;

/// Fatal startup failures: each is logged once and turned into a
/// non-zero process exit code.
#[derive(Debug, Error)]
pub enum AppError {
    /// The data directory could not be created or is not writable.
    #[error("data directory {path} is not writable")]
    DataDirUnwritable {
        /// Directory that failed to be created or written to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings store could not be opened.
    #[error("failed to open settings store")]
    SettingsStore(#[source] seedcore_settings::SettingsError),
    /// The resume store could not be opened.
    #[error("failed to open resume store")]
    ResumeStore(#[source] seedcore_resume::ResumeError),
    /// The RSS history store could not be opened.
    #[error("failed to open RSS history store")]
    RssStore(#[source] seedcore_rss::RssError),
    /// A command-line `.torrent` path or magnet argument was malformed.
    #[error("invalid command-line argument: {reason}")]
    InvalidArgument {
        /// Human-readable validation failure.
        reason: String,
    },
}
