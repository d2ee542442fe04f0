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
#![allow(clippy::too_many_arguments)]

//! The session controller: owns the external transfer engine, the torrent
//! table, the Resume Store, and the Peer Filter, and turns commands and
//! engine notifications into [`seedcore_events::Event`]s.
//!
//! Layout: `command` (the wire contract), `engine` (the transfer-engine
//! boundary), `record` (internal per-torrent bookkeeping), `schedule`
//! (bandwidth schedule evaluation), `state` (status-resolution decision
//! tree), `controller` (the loop tying everything together), `error`
//! (startup failures).

mod command;
mod controller;
mod engine;
mod error;
mod record;
mod schedule;
mod state;

pub use command::{Command, SettingsSnapshot};
pub use controller::{ControllerHandle, SessionController};
pub use engine::{
    AddOptions, Engine, EngineActivity, EngineAddResult, EngineDetailBundle, EngineHandle,
    EngineNotification, EngineStatusBundle, IpDenyRule, PeerConnection, QueuePosition,
};
pub use error::ControllerError;
pub use schedule::{BandwidthRule, BandwidthSchedule, ScheduleDecision};
pub use state::{derive_eta, derive_ratio, resolve_state};
