#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Shared domain types and the event bus for the session core.
//!
//! Layout: `info_hash` (torrent identity), `snapshot` (the read-only status
//! types observers consume), `event` (the typed event contract + bus).

mod event;
mod info_hash;
mod snapshot;

pub use event::{Event, EventBus, EventEnvelope, EventId, EventStream};
pub use info_hash::{InfoHash, InfoHashParseError};
pub use snapshot::{
    DetailData, DetailFile, DetailPeer, DetailTracker, FilePriority, PieceState, SessionStats,
    TorrentSnapshot, TorrentState, TrackerStatus,
};
