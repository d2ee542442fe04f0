use thiserror::Error;

/// Startup and command-boundary failures the controller can surface.
/// Per-torrent engine faults, transient I/O, and storage corruption are
/// not represented here: those are isolated per torrent and surfaced
/// as `TorrentError`/`AddFailed` events or log lines, never as a
/// `Result` the caller must handle.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The resume store could not be opened during `Initialize`.
    #[error("failed to open resume store")]
    ResumeStoreOpen(#[source] seedcore_resume::ResumeError),
    /// The settings store could not be opened during `Initialize`.
    #[error("failed to open settings store")]
    SettingsStoreOpen(#[source] seedcore_settings::SettingsError),
    /// A command was posted before `Initialize` completed.
    #[error("controller received a command before Initialize")]
    NotInitialized,
    /// `Initialize` was posted more than once.
    #[error("controller already initialized")]
    AlreadyInitialized,
}
