use std::path::PathBuf;

use seedcore_events::{FilePriority, InfoHash};
use tokio::sync::oneshot;

use crate::engine::QueuePosition;
use crate::schedule::BandwidthSchedule;

/// Snapshot of settings the controller re-reads on `Initialize` and every
/// `ApplySettings`.
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    /// Default save path for torrents that don't specify one.
    pub default_save_path: String,
    /// Session-wide download limit, bytes/sec; 0 = unlimited.
    pub max_download_speed: u64,
    /// Session-wide upload limit, bytes/sec; 0 = unlimited.
    pub max_upload_speed: u64,
    /// `on_complete_action`: 0=nothing, 1=pause, 2=remove.
    pub on_complete_action: u8,
    /// Ratio threshold above which `ratio_action` applies; 0 disables it.
    pub max_ratio: f64,
    /// `ratio_action`: 0=pause, 1=remove.
    pub ratio_action: u8,
    /// Whether the peer filter is active at all.
    pub peer_filter_enabled: bool,
    /// Suppress or allow the built-in Xunlei-family rules.
    pub ban_xunlei: bool,
    /// Suppress or allow the built-in QQ-family rule.
    pub ban_qq: bool,
    /// Suppress or allow the built-in Baidu-family rule.
    pub ban_baidu: bool,
    /// Path to an IP blocklist file, or empty if none configured.
    pub ip_blocklist_path: String,
    /// Bandwidth schedule evaluated every 60 s.
    pub bandwidth_schedule: BandwidthSchedule,
}

/// Every mutation the session controller accepts. All commands are
/// fire-and-forget: outcomes, if any, arrive as
/// [`seedcore_events::Event`]s on the controller's event bus. The sole
/// exception is [`Command::Shutdown`], which carries a reply channel the
/// caller awaits so it can block until the controller has fully drained.
#[derive(Debug)]
pub enum Command {
    /// Must be the first command posted; opens the resume/settings
    /// stores, loads persisted torrents, and arms the periodic timers.
    Initialize {
        /// Settings snapshot to apply immediately.
        settings: SettingsSnapshot,
    },
    /// Stops all timers, drains outstanding resume saves (up to 10s), and
    /// closes every store. The caller is unblocked once `Stopped` has
    /// been published.
    Shutdown {
        /// Signaled once shutdown has fully completed.
        ack: oneshot::Sender<()>,
    },
    /// Admit a `.torrent` metainfo file already read from disk.
    AddTorrentFile {
        /// Path to the `.torrent` file.
        path: PathBuf,
        /// Save path override; `None` uses the settings default.
        save_path: Option<String>,
        /// Category to assign.
        category: String,
        /// Tags to assign.
        tags: Vec<String>,
        /// Whether to add in a paused state.
        paused: bool,
        /// Whether to force sequential download from the start.
        sequential: bool,
    },
    /// Admit a magnet URI (must begin `magnet:`).
    AddMagnet {
        /// The magnet URI.
        uri: String,
        /// Save path override; `None` uses the settings default.
        save_path: Option<String>,
        /// Category to assign.
        category: String,
        /// Tags to assign.
        tags: Vec<String>,
        /// Whether to add in a paused state.
        paused: bool,
    },
    /// Remove a torrent, optionally deleting its on-disk data.
    Remove {
        /// Torrent to remove.
        info_hash: InfoHash,
        /// Whether to delete payload data on disk.
        delete_files: bool,
    },
    /// Pause, clearing the auto-managed flag.
    Pause {
        /// Torrent to pause.
        info_hash: InfoHash,
    },
    /// Resume, setting the auto-managed flag.
    Resume {
        /// Torrent to resume.
        info_hash: InfoHash,
    },
    /// Clear auto-managed and resume, bypassing queue limits.
    ForceResume {
        /// Torrent to force-resume.
        info_hash: InfoHash,
    },
    /// Trigger a full piece recheck.
    ForceRecheck {
        /// Torrent to recheck.
        info_hash: InfoHash,
    },
    /// Trigger an immediate tracker reannounce.
    ForceReannounce {
        /// Torrent to reannounce.
        info_hash: InfoHash,
    },
    /// Set per-torrent speed limits; 0 = unlimited.
    SetSpeedLimit {
        /// Target torrent.
        info_hash: InfoHash,
        /// Download limit, bytes/sec.
        download_bps: u64,
        /// Upload limit, bytes/sec.
        upload_bps: u64,
    },
    /// Reposition within the download queue.
    QueueAction {
        /// Target torrent.
        info_hash: InfoHash,
        /// Requested position.
        position: QueuePosition,
    },
    /// Toggle sequential download mode.
    SetSequential {
        /// Target torrent.
        info_hash: InfoHash,
        /// Desired sequential state.
        sequential: bool,
    },
    /// Override a single file's download priority.
    SetFilePriority {
        /// Target torrent.
        info_hash: InfoHash,
        /// File index within the torrent.
        file_index: u32,
        /// Desired priority.
        priority: FilePriority,
    },
    /// Add a tracker URL.
    AddTracker {
        /// Target torrent.
        info_hash: InfoHash,
        /// Tracker announce URL.
        url: String,
    },
    /// Remove a tracker URL.
    RemoveTracker {
        /// Target torrent.
        info_hash: InfoHash,
        /// Tracker announce URL.
        url: String,
    },
    /// Request a fresh magnet URI; the result arrives as
    /// `MagnetUriReady`.
    RequestMagnetUri {
        /// Target torrent.
        info_hash: InfoHash,
    },
    /// Pause every tracked torrent.
    PauseAll,
    /// Resume every tracked torrent.
    ResumeAll,
    /// Re-read all limits, reload the IP blocklist, and reconfigure the
    /// peer filter from a fresh settings snapshot.
    ApplySettings {
        /// The new settings snapshot.
        settings: SettingsSnapshot,
    },
    /// Control which torrent produces `DetailUpdated` events.
    SetFocusedTorrent {
        /// Torrent to focus, or `None` to stop producing detail events.
        info_hash: Option<InfoHash>,
    },
}
