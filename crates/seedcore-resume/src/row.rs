use seedcore_events::InfoHash;

/// One durable per-torrent record, as persisted in `resume_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeRow {
    /// Torrent identity; primary key.
    pub info_hash: InfoHash,
    /// Opaque, engine-defined resume payload.
    pub resume_blob: Vec<u8>,
    /// Display name at the time of the last save.
    pub name: String,
    /// User-assigned category, possibly empty.
    pub category: String,
    /// User-assigned tags, in insertion order.
    pub tags: Vec<String>,
    /// Seconds since epoch when the torrent was first added.
    pub added_time: i64,
    /// Absolute save path at the time of the last save.
    pub save_path: String,
    /// Per-torrent download limit, bytes/sec; 0 = unlimited.
    pub dl_limit: u64,
    /// Per-torrent upload limit, bytes/sec; 0 = unlimited.
    pub ul_limit: u64,
}
