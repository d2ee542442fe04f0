use std::collections::VecDeque;

use seedcore_events::{InfoHash, TorrentSnapshot};

use crate::engine::EngineHandle;

/// A bounded FIFO of rate samples, oldest evicted first once `capacity` is
/// reached. Shared shape for per-torrent (120-sample) and session-wide
/// (300-sample) histories.
#[derive(Debug, Clone, Default)]
pub struct BoundedHistory {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl BoundedHistory {
    /// Construct an empty history bounded at `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append a sample, evicting the oldest if at capacity.
    pub fn push(&mut self, value: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Render the history oldest-first, as the plain `Vec<u64>` the
    /// snapshot types expose.
    #[must_use]
    pub fn as_vec(&self) -> Vec<u64> {
        self.samples.iter().copied().collect()
    }
}

/// Internal per-torrent record, owned exclusively by the controller loop.
/// Exactly one exists per `info_hash` for the lifetime between a
/// successful `AddTorrent` and the moment `Remove` completes.
pub struct TorrentRecord {
    /// Torrent identity.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Absolute save path.
    pub save_path: String,
    /// User-assigned category.
    pub category: String,
    /// User-assigned tags, insertion order, de-duplicated.
    pub tags: Vec<String>,
    /// Seconds since epoch when the torrent was added.
    pub added_time: i64,
    /// Handle into the external engine; `None` only transiently during
    /// teardown.
    pub engine_handle: Option<EngineHandle>,
    /// Last resume blob seen from the engine, if any save has completed.
    pub engine_resume_blob: Option<Vec<u8>>,
    /// Most recently captured snapshot, refreshed once per stats tick.
    pub latest_snapshot: Option<TorrentSnapshot>,
    /// Per-torrent download-rate history, capped at 120 samples.
    pub download_history: BoundedHistory,
    /// Per-torrent upload-rate history, capped at 120 samples.
    pub upload_history: BoundedHistory,
    /// Per-torrent download limit, bytes/sec; 0 = unlimited.
    pub download_limit: u64,
    /// Per-torrent upload limit, bytes/sec; 0 = unlimited.
    pub upload_limit: u64,
    /// Engine's auto-managed flag, tracked locally so `Pause`/`Resume`
    /// can report it without an extra engine round-trip.
    pub auto_managed: bool,
    /// Number of outstanding resume saves not yet acknowledged, used only
    /// during the shutdown drain.
    pub pending_resume_save: bool,
}

impl TorrentRecord {
    /// Construct a fresh record for a just-admitted torrent.
    #[must_use]
    pub fn new(
        info_hash: InfoHash,
        name: String,
        save_path: String,
        category: String,
        tags: Vec<String>,
        added_time: i64,
        engine_handle: EngineHandle,
        auto_managed: bool,
    ) -> Self {
        Self {
            info_hash,
            name,
            save_path,
            category,
            tags,
            added_time,
            engine_handle: Some(engine_handle),
            engine_resume_blob: None,
            latest_snapshot: None,
            download_history: BoundedHistory::new(120),
            upload_history: BoundedHistory::new(120),
            download_limit: 0,
            upload_limit: 0,
            auto_managed,
            pending_resume_save: false,
        }
    }
}
