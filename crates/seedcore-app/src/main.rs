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
#![allow(clippy::multiple_crate_versions)]

//! Binary entrypoint that wires the session controller, RSS ingester, and
//! persistent stores together and blocks until a shutdown signal arrives.

/// Application bootstrap and service wiring.
pub mod bootstrap;
/// Command-line argument parsing.
pub mod cli;
/// Top-level startup error types.
pub mod error;

use clap::Parser;

/// Parses arguments, runs the application until shutdown, and exits with a
/// non-zero status on any [`error::AppError`].
#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    if let Err(err) = bootstrap::run_app(cli).await {
        eprintln!("seedcore: {err}");
        std::process::exit(1);
    }
}
