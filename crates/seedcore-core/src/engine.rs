use async_trait::async_trait;
use seedcore_events::{DetailPeer, DetailTracker, FilePriority, InfoHash, PieceState};

/// Opaque handle the engine assigns when a torrent is admitted. The
/// controller treats this as a black box and only ever compares it for
/// equality; losing it (an engine restart, an internal eviction) is
/// modeled by [`Engine::capture_status`] returning `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// Knobs accompanying a torrent admission request.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Save path override; `None` means "use the settings default".
    pub save_path: Option<String>,
    /// User-assigned category, possibly empty.
    pub category: String,
    /// User-assigned tags.
    pub tags: Vec<String>,
    /// Start the torrent paused (not auto-managed).
    pub paused: bool,
    /// Force sequential download strategy from the start.
    pub sequential: bool,
}

/// Destination for a `QueueAction` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Move to the front of the queue.
    Top,
    /// Move up one position.
    Up,
    /// Move down one position.
    Down,
    /// Move to the back of the queue.
    Bottom,
}

/// Coarse lifecycle activity the engine reports for a torrent, the raw
/// input to the controller's state-resolution decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineActivity {
    /// Verifying files or resume data against disk.
    CheckingFiles,
    /// Verifying previously-saved resume data.
    CheckingResume,
    /// Resolving metadata from a magnet link.
    DownloadingMetadata,
    /// Actively exchanging payload data.
    Downloading,
    /// Finished downloading, not yet confirmed seeding.
    Finished,
    /// Uploading to peers after completion.
    Seeding,
    /// Any other engine-internal activity not named above.
    Other,
}

/// Single-query-per-tick status bundle the controller turns into a
/// [`seedcore_events::TorrentSnapshot`] via the state-resolution decision
/// tree.
#[derive(Debug, Clone)]
pub struct EngineStatusBundle {
    /// Display name reported by the engine.
    pub name: String,
    /// Absolute save path reported by the engine.
    pub save_path: String,
    /// Whether metadata (file list, piece layout) has been resolved.
    pub has_metadata: bool,
    /// Non-zero when the torrent has hit an unrecoverable engine error.
    pub error_code: u32,
    /// Human-readable detail for `error_code != 0`.
    pub error_message: Option<String>,
    /// Engine-reported paused bit.
    pub paused: bool,
    /// Engine-reported auto-managed flag.
    pub auto_managed: bool,
    /// Coarse lifecycle activity.
    pub activity: EngineActivity,
    /// Total payload size in bytes.
    pub total_size: u64,
    /// Bytes verified on disk so far.
    pub completed_size: u64,
    /// Bytes the user actually wants (after file-priority selection);
    /// used for the ETA calculation in place of `total_size`.
    pub total_wanted: u64,
    /// Current download rate, bytes/sec.
    pub download_speed: u64,
    /// Current upload rate, bytes/sec.
    pub upload_speed: u64,
    /// Lifetime bytes downloaded.
    pub total_downloaded: u64,
    /// Lifetime bytes uploaded.
    pub total_uploaded: u64,
    /// Peers reporting the full payload.
    pub num_seeds: u32,
    /// Peers not yet reporting the full payload.
    pub num_peers: u32,
    /// Total open connections.
    pub num_connections: u32,
}

/// Per-torrent extended status, captured only for the currently focused
/// torrent.
#[derive(Debug, Clone, Default)]
pub struct EngineDetailBundle {
    /// Per-file breakdown.
    pub files: Vec<seedcore_events::DetailFile>,
    /// Currently connected peers.
    pub peers: Vec<DetailPeer>,
    /// Configured trackers.
    pub trackers: Vec<DetailTracker>,
    /// Per-piece download state.
    pub pieces: Vec<PieceState>,
    /// Piece size in bytes.
    pub piece_length: u64,
}

/// A newly connected peer, as reported by the engine.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    /// Peer's reported IP address (no port).
    pub address: String,
    /// First 8 bytes of the peer-id the peer presented at handshake.
    pub peer_id_prefix: [u8; 8],
    /// Peer's self-reported client string.
    pub client: String,
}

/// An asynchronous notification surfaced by the engine's bounded FIFO
/// queue and drained on every engine-drain tick.
#[derive(Debug, Clone)]
pub enum EngineNotification {
    /// A torrent finished downloading its payload.
    Finished(EngineHandle),
    /// A torrent hit an unrecoverable engine error.
    Error(EngineHandle, String),
    /// Metadata became available for a magnet-added torrent.
    MetadataReceived(EngineHandle),
    /// A requested resume-data save succeeded.
    SaveResumeOk(EngineHandle, Vec<u8>),
    /// A requested resume-data save failed.
    SaveResumeFailed(EngineHandle),
    /// A new peer connection was accepted.
    PeerConnected(EngineHandle, PeerConnection),
    /// The engine began or stopped listening on its configured port.
    ListenStatus {
        /// Whether the listen attempt succeeded.
        succeeded: bool,
        /// Human-readable detail.
        detail: String,
    },
    /// A port-mapping request (UPnP/NAT-PMP) completed.
    PortMapped(u16),
}

/// A single inclusive IP range to deny at the engine's IP filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpDenyRule {
    /// First address in the inclusive range.
    pub start: std::net::Ipv4Addr,
    /// Last address in the inclusive range.
    pub end: std::net::Ipv4Addr,
}

/// Result of a successful admission. The engine resolves the info-hash as
/// part of adding the torrent (from the parsed metainfo or magnet), so the
/// controller never has to parse metainfo itself to learn it.
#[derive(Debug, Clone)]
pub struct EngineAddResult {
    /// Opaque handle for all subsequent per-torrent calls.
    pub handle: EngineHandle,
    /// Info-hash the engine resolved for the admitted torrent.
    pub info_hash: InfoHash,
}

/// The external BitTorrent transfer engine boundary. Every mutation and
/// every status query happens from the controller loop; implementations
/// need not be internally thread-safe beyond `Send + Sync`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Admit a `.torrent` metainfo file already read from `path`.
    async fn add_torrent_file(
        &self,
        path: &std::path::Path,
        options: &AddOptions,
    ) -> anyhow::Result<EngineAddResult>;

    /// Admit a magnet URI (already validated to begin with `magnet:`).
    async fn add_magnet(&self, uri: &str, options: &AddOptions)
        -> anyhow::Result<EngineAddResult>;

    /// Re-admit a torrent from a previously saved resume-data blob, used
    /// only while replaying the Resume Store at startup.
    async fn add_from_resume(
        &self,
        resume_blob: &[u8],
        save_path: &str,
    ) -> anyhow::Result<EngineAddResult>;

    /// Remove a torrent, optionally deleting its on-disk data.
    async fn remove(&self, handle: EngineHandle, delete_files: bool) -> anyhow::Result<()>;

    /// Pause a torrent, clearing its auto-managed flag.
    async fn pause(&self, handle: EngineHandle);

    /// Resume a torrent, setting its auto-managed flag.
    async fn resume(&self, handle: EngineHandle);

    /// Clear auto-managed and resume, bypassing queue limits.
    async fn force_resume(&self, handle: EngineHandle);

    /// Trigger a full piece recheck.
    async fn force_recheck(&self, handle: EngineHandle);

    /// Trigger an immediate tracker reannounce.
    async fn force_reannounce(&self, handle: EngineHandle);

    /// Set per-torrent speed limits; `0` means unlimited.
    async fn set_speed_limit(&self, handle: EngineHandle, download_bps: u64, upload_bps: u64);

    /// Reposition a torrent within the download queue.
    async fn queue_action(&self, handle: EngineHandle, position: QueuePosition);

    /// Toggle sequential download mode.
    async fn set_sequential(&self, handle: EngineHandle, sequential: bool);

    /// Override a single file's download priority.
    async fn set_file_priority(&self, handle: EngineHandle, file_index: u32, priority: FilePriority);

    /// Add a tracker URL to a torrent.
    async fn add_tracker(&self, handle: EngineHandle, url: &str);

    /// Remove a tracker URL from a torrent.
    async fn remove_tracker(&self, handle: EngineHandle, url: &str);

    /// Generate a fresh magnet URI for an existing torrent.
    async fn request_magnet_uri(&self, handle: EngineHandle) -> Option<String>;

    /// Pause every torrent without altering their auto-managed flags.
    async fn pause_all(&self);

    /// Resume every torrent without altering their auto-managed flags.
    async fn resume_all(&self);

    /// Apply global (session-wide) speed limits; `0` means unlimited.
    async fn apply_global_limits(&self, download_bps: u64, upload_bps: u64);

    /// Install a single-address or ranged deny rule into the engine's IP
    /// filter.
    async fn install_ip_deny_rule(&self, rule: IpDenyRule);

    /// Request an asynchronous resume-data save; the result arrives as a
    /// `SaveResumeOk`/`SaveResumeFailed` notification.
    async fn request_save_resume(&self, handle: EngineHandle);

    /// Drain every notification currently queued by the engine.
    async fn poll_notifications(&self) -> Vec<EngineNotification>;

    /// Capture a single status bundle for `handle`. Returns `None` if the
    /// handle is no longer valid (the engine lost it), which the
    /// controller turns into `TorrentSnapshot { valid: false, state:
    /// Error, .. }`.
    async fn capture_status(&self, handle: EngineHandle) -> Option<EngineStatusBundle>;

    /// Capture the extended detail view for `handle`, for the currently
    /// focused torrent only.
    async fn capture_detail(&self, handle: EngineHandle) -> Option<EngineDetailBundle>;

    /// Current count of reachable DHT nodes (0 if DHT is disabled).
    async fn dht_node_count(&self) -> u32;

    /// Aggregate session-wide download/upload rates across all torrents.
    async fn session_rates(&self) -> (u64, u64);

    /// Tear down the engine at the end of the shutdown protocol, once every
    /// outstanding resume save has been acknowledged or timed out.
    async fn shutdown(&self);
}
