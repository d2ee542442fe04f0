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

//! Shared logging setup for every binary and integration test in the
//! workspace. No OpenTelemetry exporter or HTTP request-context layer:
//! this core has no API surface to instrument.

mod init;

pub use init::{init_logging, LogFormat, LoggingConfig, DEFAULT_LOG_LEVEL};
