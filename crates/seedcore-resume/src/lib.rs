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

//! Durable per-torrent resume state, backed by a single-file SQLite
//! database with an additive, idempotent migration protocol.

mod error;
mod migrations;
mod row;
mod store;

pub use error::ResumeError;
pub use row::ResumeRow;
pub use store::ResumeStore;
