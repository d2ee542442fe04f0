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

//! Peer-id and client-string based peer banning.
//!
//! Pure decision logic with no I/O of its own: the controller feeds it
//! connection events and acts on the returned [`Decision`].

mod blocklist;
mod config;
mod filter;

pub use blocklist::{parse_blocklist, IpRange};
pub use config::{CustomRule, PeerFilterConfig};
pub use filter::{BanLogEntry, Decision, PeerFilter};
