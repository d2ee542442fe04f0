use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use seedcore_core::{BandwidthSchedule, ControllerHandle, SessionController, SettingsSnapshot};
use seedcore_events::EventBus;
use seedcore_rss::RssIngester;
use seedcore_settings::Settings;
use seedcore_testkit::FakeEngine;
use serde_json::Value;
use tracing::info;

use crate::cli::{Cli, StartupTarget};
use crate::error::{AppError, AppResult};

/// Root directory for this process's persisted state: `~/.seedcore`
/// unless overridden.
fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".seedcore"))
        .unwrap_or_else(|_| PathBuf::from(".seedcore"))
}

/// Resolve the data directory from the CLI, environment, or default, and
/// ensure it exists.
async fn prepare_data_dir(cli: &Cli) -> AppResult<PathBuf> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|source| AppError::DataDirUnwritable { path: data_dir.clone(), source })?;
    Ok(data_dir)
}

/// Build a [`SettingsSnapshot`] from the settings store's current values,
/// falling back to each key's declared default if the stored value is
/// the wrong shape.
fn settings_snapshot_from(values: &BTreeMap<String, Value>) -> SettingsSnapshot {
    SettingsSnapshot {
        default_save_path: str_value(values, "default_save_path", ""),
        max_download_speed: u64_value(values, "max_download_speed", 0),
        max_upload_speed: u64_value(values, "max_upload_speed", 13_312),
        on_complete_action: u8_value(values, "on_complete_action", 1),
        max_ratio: f64_value(values, "max_ratio", 2.0),
        ratio_action: u8_value(values, "ratio_action", 0),
        peer_filter_enabled: bool_value(values, "peer_filter_enabled", true),
        ban_xunlei: bool_value(values, "auto_ban_xunlei", true),
        ban_qq: bool_value(values, "auto_ban_qq", true),
        ban_baidu: bool_value(values, "auto_ban_baidu", true),
        ip_blocklist_path: str_value(values, "ip_blocklist_path", ""),
        bandwidth_schedule: values
            .get("bandwidth_schedule")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_else(BandwidthSchedule::default),
    }
}

fn str_value(values: &BTreeMap<String, Value>, key: &str, default: &str) -> String {
    values.get(key).and_then(Value::as_str).map_or_else(|| default.to_string(), str::to_string)
}

fn u64_value(values: &BTreeMap<String, Value>, key: &str, default: u64) -> u64 {
    values.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn u8_value(values: &BTreeMap<String, Value>, key: &str, default: u8) -> u8 {
    values.get(key).and_then(Value::as_u64).and_then(|v| u8::try_from(v).ok()).unwrap_or(default)
}

fn f64_value(values: &BTreeMap<String, Value>, key: &str, default: f64) -> f64 {
    values.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn bool_value(values: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    values.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Wire the settings store, session controller, and RSS ingester together
/// and run until a shutdown signal arrives or the optional startup
/// target has been posted.
///
/// # Errors
///
/// Returns an [`AppError`] on any `FatalStartup` condition: an unwritable
/// data directory, or a store that cannot be opened.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let logging = seedcore_telemetry::LoggingConfig::default();
    let _ = seedcore_telemetry::init_logging(&logging);

    let startup_target = cli.startup_target().map_err(|reason| AppError::InvalidArgument { reason })?;
    let data_dir = prepare_data_dir(&cli).await?;
    info!(data_dir = %data_dir.display(), "starting seedcore");

    let settings = Settings::open(&data_dir.join("settings.db")).await.map_err(AppError::SettingsStore)?;
    let snapshot_values = settings.get_all().await.map_err(AppError::SettingsStore)?;
    let settings_snapshot = settings_snapshot_from(&snapshot_values);

    let events = EventBus::new();
    let engine = Arc::new(FakeEngine::new());
    let controller = SessionController::spawn(engine, data_dir.clone(), events.clone());
    controller.initialize(settings_snapshot);

    let ingester = RssIngester::spawn(controller.clone(), events.clone(), data_dir.clone())
        .await
        .map_err(AppError::RssStore)?;

    if let Some(target) = startup_target {
        post_startup_target(&controller, target);
    }

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, draining");
    ingester.shutdown().await;
    controller.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

fn post_startup_target(controller: &ControllerHandle, target: StartupTarget) {
    match target {
        StartupTarget::Magnet(uri) => controller.add_magnet(uri, None, String::new(), Vec::new(), false),
        StartupTarget::TorrentFile(path) => {
            controller.add_torrent_file(path, None, String::new(), Vec::new(), false, false);
        }
    }
}

async fn wait_for_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal, shutting down immediately");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_snapshot_falls_back_to_defaults_when_map_is_empty() {
        let snapshot = settings_snapshot_from(&BTreeMap::new());
        assert_eq!(snapshot.max_upload_speed, 13_312);
        assert_eq!(snapshot.on_complete_action, 1);
        assert!(snapshot.peer_filter_enabled);
        assert!(!snapshot.bandwidth_schedule.enabled);
    }

    #[test]
    fn settings_snapshot_reads_stored_values() {
        let mut values = BTreeMap::new();
        values.insert("max_download_speed".to_string(), Value::from(4096));
        values.insert("default_save_path".to_string(), Value::from("/data/downloads"));
        let snapshot = settings_snapshot_from(&values);
        assert_eq!(snapshot.max_download_speed, 4096);
        assert_eq!(snapshot.default_save_path, "/data/downloads");
    }

    #[tokio::test]
    async fn prepare_data_dir_creates_a_missing_directory() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("nested").join("data");
        let cli = Cli { target: None, data_dir: Some(nested.clone()) };
        let resolved = prepare_data_dir(&cli).await.unwrap();
        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn unrecognized_startup_argument_is_rejected_before_any_io() {
        let cli = Cli { target: Some("not-a-target".to_string()), data_dir: None };
        assert!(cli.startup_target().is_err());
    }
}
