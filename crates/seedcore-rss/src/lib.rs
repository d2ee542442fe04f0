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

//! RSS 2.0 / Atom 1.0 feed ingestion: polls subscribed feeds on
//! independent timers, extracts downloadable items, de-duplicates them
//! against a persistent history store, and hands new matches to the
//! session controller.
//!
//! Layout: `config` (feed subscriptions), `item` (feed parsing), `history`
//! (seen-items store), `fetch` (bounded-concurrency HTTP fetches),
//! `ingester` (the actor tying everything together), `error` (failures).

mod config;
mod error;
mod fetch;
mod history;
mod ingester;
mod item;

pub use config::{FeedConfig, MIN_INTERVAL_MINUTES};
pub use error::RssError;
pub use fetch::FetchPool;
pub use history::FeedHistory;
pub use ingester::{IngesterHandle, RssIngester};
pub use item::{parse_feed, FeedItem};
