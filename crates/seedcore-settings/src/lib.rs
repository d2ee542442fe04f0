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

//! Persistent key/value configuration, backed by a single-file SQLite
//! database, plus the category and tag auxiliary lists.

mod category;
mod defaults;
mod error;
mod store;

pub use category::Category;
pub use defaults::declared_default;
pub use error::{SettingsError, SettingsResult};
pub use store::Settings;
