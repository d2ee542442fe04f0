use serde::{Deserialize, Serialize};

use crate::info_hash::InfoHash;

/// Lifecycle state of a torrent, resolved from the underlying engine's raw
/// status fields by a fixed, ordered decision tree (see the controller for
/// the resolution order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Actively exchanging payload data with peers.
    Downloading,
    /// Finished downloading and uploading to peers.
    Seeding,
    /// Paused by the user (not auto-managed).
    Paused,
    /// Paused by queueing policy (auto-managed).
    Queued,
    /// Verifying files or resume data against disk.
    Checking,
    /// Stopped on an unrecoverable engine error; see `error_message`.
    Error,
    /// Downloading but making no progress despite available seeds.
    Stalled,
    /// Finished downloading, not yet confirmed seeding.
    Completed,
    /// Resolving metadata from a magnet link.
    Metadata,
    /// Relocating its data to a new save path.
    Moving,
}

/// Reported tracker reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// No announce has been attempted yet.
    NotContacted,
    /// Last announce succeeded.
    Working,
    /// An announce is currently in flight.
    Updating,
    /// Last announce failed; see the tracker's `message`.
    Error,
}

/// Download state of an individual piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceState {
    /// Not yet requested from any peer.
    Missing = 0,
    /// Currently being requested.
    Downloading = 1,
    /// Verified and stored on disk.
    Have = 2,
}

/// Per-file download priority. The numeric values match the engine's wire
/// encoding and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// File is excluded from download.
    Skip = 0,
    /// Below-normal priority.
    Low = 1,
    /// Default priority.
    Normal = 4,
    /// Above-normal priority.
    High = 7,
}

impl FilePriority {
    /// Map a raw priority value to its nearest defined variant, clamping
    /// unrecognized values to `Normal` rather than rejecting them.
    #[must_use]
    pub const fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Skip,
            1..=3 => Self::Low,
            5..=255 => Self::High,
            _ => Self::Normal,
        }
    }
}

/// Immutable, point-in-time view of a single torrent's status. Safe to hand
/// to any observer: it borrows nothing from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    /// Torrent identity.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Absolute path payload is saved under.
    pub save_path: String,
    /// `false` only if the controller has lost the engine handle for this
    /// torrent (the record should be treated as stale).
    pub valid: bool,
    /// Whether metadata (file list, piece layout) has been resolved.
    pub has_metadata: bool,
    /// Resolved lifecycle state.
    pub state: TorrentState,
    /// Present only when `state == Error`.
    pub error_message: Option<String>,
    /// Fraction complete, in `[0, 1]`.
    pub progress: f64,
    /// Total payload size in bytes.
    pub total_size: u64,
    /// Bytes verified on disk so far.
    pub completed_size: u64,
    /// Current download rate, bytes/sec.
    pub download_speed: u64,
    /// Current upload rate, bytes/sec.
    pub upload_speed: u64,
    /// Lifetime bytes downloaded.
    pub total_downloaded: u64,
    /// Lifetime bytes uploaded.
    pub total_uploaded: u64,
    /// Estimated seconds to completion; 0 when not downloading.
    pub eta_seconds: u64,
    /// `total_uploaded / total_downloaded`, 0 if nothing downloaded yet.
    pub ratio: f64,
    /// Number of connected peers that report having the full payload.
    pub num_seeds: u32,
    /// Number of connected peers that do not yet have the full payload.
    pub num_peers: u32,
    /// Total open peer connections.
    pub num_connections: u32,
    /// Per-torrent download limit, bytes/sec; 0 = unlimited.
    pub download_limit: u64,
    /// Per-torrent upload limit, bytes/sec; 0 = unlimited.
    pub upload_limit: u64,
    /// User-assigned category, possibly empty.
    pub category: String,
    /// User-assigned tags, in insertion order.
    pub tags: Vec<String>,
    /// Seconds since epoch when the torrent was added.
    pub added_time: i64,
}

/// Session-wide statistics, produced once per stats tick and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Aggregate download rate across all torrents, bytes/sec.
    pub download_rate: u64,
    /// Aggregate upload rate across all torrents, bytes/sec.
    pub upload_rate: u64,
    /// Number of reachable DHT nodes, if DHT is enabled.
    pub dht_nodes: u32,
    /// Bounded history of `download_rate` samples, oldest first, capped at
    /// 300 entries.
    pub dl_history: Vec<u64>,
    /// Bounded history of `upload_rate` samples, oldest first, capped at
    /// 300 entries.
    pub ul_history: Vec<u64>,
    /// Number of torrents currently tracked.
    pub torrent_count: usize,
    /// Snapshot of every tracked torrent as of this tick.
    pub torrents: Vec<TorrentSnapshot>,
}

/// A single file inside a torrent's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailFile {
    /// Index within the torrent's file list.
    pub index: usize,
    /// Path relative to the torrent's save directory.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Fraction of this file verified so far, in `[0, 1]`.
    pub fraction_complete: f64,
    /// Current download priority.
    pub priority: FilePriority,
}

/// A single connected peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPeer {
    /// Peer's reported IP address.
    pub address: String,
    /// Peer's TCP/uTP port.
    pub port: u16,
    /// Peer's self-reported client string.
    pub client: String,
    /// Engine-reported connection flags (opaque, rendered verbatim).
    pub flags: String,
    /// Download rate from this peer, bytes/sec.
    pub download_speed: u64,
    /// Upload rate to this peer, bytes/sec.
    pub upload_speed: u64,
    /// Fraction of the payload this peer reports having.
    pub progress: f64,
    /// Lifetime bytes downloaded from this peer.
    pub total_downloaded: u64,
    /// Lifetime bytes uploaded to this peer.
    pub total_uploaded: u64,
}

/// A single configured tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailTracker {
    /// Tracker announce URL.
    pub url: String,
    /// Last known reachability.
    pub status: TrackerStatus,
    /// Seeds reported by the tracker's last scrape, if any.
    pub seeds: Option<u32>,
    /// Peers reported by the tracker's last scrape, if any.
    pub peers: Option<u32>,
    /// Human-readable status detail (error text, or empty).
    pub message: String,
}

/// Full detail view for a single, currently focused torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailData {
    /// Torrent this detail view describes.
    pub info_hash: InfoHash,
    /// Per-file breakdown.
    pub files: Vec<DetailFile>,
    /// Currently connected peers.
    pub peers: Vec<DetailPeer>,
    /// Configured trackers.
    pub trackers: Vec<DetailTracker>,
    /// Per-piece download state.
    pub pieces: Vec<PieceState>,
    /// Piece size in bytes.
    pub piece_length: u64,
    /// Bounded per-torrent download-rate history, capped at 120 entries.
    pub dl_history: Vec<u64>,
    /// Bounded per-torrent upload-rate history, capped at 120 entries.
    pub ul_history: Vec<u64>,
}
