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

//! Deterministic test doubles for the session core: a scriptable
//! [`FakeEngine`] standing in for the external transfer engine, so the
//! controller's command dispatch and notification pipeline can be exercised
//! without a real BitTorrent implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use seedcore_core::{
    AddOptions, Engine, EngineActivity, EngineAddResult, EngineDetailBundle, EngineHandle,
    EngineNotification, EngineStatusBundle, IpDenyRule, QueuePosition,
};
use seedcore_events::{FilePriority, InfoHash};

/// Derive a syntactically valid v1 info-hash from an arbitrary byte seed, so
/// tests can mint distinct hashes without hand-writing 40 hex digits each
/// time.
#[must_use]
pub fn seeded_info_hash(seed: u8) -> InfoHash {
    let hex: String = [seed; 20].iter().map(|b| format!("{b:02x}")).collect();
    InfoHash::parse(&hex).expect("seeded hex is always a valid v1 info-hash")
}

/// Build a minimal magnet URI around a seeded info-hash, for tests that add
/// torrents by magnet rather than by file.
#[must_use]
pub fn seeded_magnet(seed: u8) -> String {
    format!("magnet:?xt=urn:btih:{}", seeded_info_hash(seed))
}

#[derive(Default)]
struct State {
    next_handle: AtomicU64,
    statuses: Mutex<HashMap<u64, EngineStatusBundle>>,
    notifications: Mutex<Vec<EngineNotification>>,
    deny_rules: Mutex<Vec<IpDenyRule>>,
    removed: Mutex<Vec<EngineHandle>>,
    shutdown_called: Mutex<bool>,
}

/// An in-memory [`Engine`] whose status bundles and notification queue are
/// driven entirely by the test, not by any real download activity.
///
/// Every admitted torrent starts in [`EngineActivity::Downloading`] at 0%
/// complete; use [`FakeEngine::set_status`] to move it through the
/// lifecycle a test cares about, and [`FakeEngine::push_notification`] to
/// schedule the next `poll_notifications` drain.
#[derive(Default)]
pub struct FakeEngine {
    state: State,
}

impl FakeEngine {
    /// Construct an engine with no admitted torrents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the status bundle reported for `handle`.
    pub fn set_status(&self, handle: EngineHandle, status: EngineStatusBundle) {
        self.state.statuses.lock().unwrap().insert(handle.0, status);
    }

    /// Queue a notification to be returned by the next `poll_notifications`.
    pub fn push_notification(&self, notification: EngineNotification) {
        self.state.notifications.lock().unwrap().push(notification);
    }

    /// Handles passed to `remove`, in call order; lets a test assert a
    /// duplicate admission was correctly undone.
    #[must_use]
    pub fn removed_handles(&self) -> Vec<EngineHandle> {
        self.state.removed.lock().unwrap().clone()
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn was_shut_down(&self) -> bool {
        *self.state.shutdown_called.lock().unwrap()
    }

    fn admit(&self, info_hash: InfoHash) -> EngineAddResult {
        let id = self.state.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = EngineHandle(id);
        self.state.statuses.lock().unwrap().insert(id, default_status(&info_hash));
        EngineAddResult { handle, info_hash }
    }
}

fn default_status(info_hash: &InfoHash) -> EngineStatusBundle {
    EngineStatusBundle {
        name: info_hash.to_string(),
        save_path: "/tmp".to_string(),
        has_metadata: true,
        error_code: 0,
        error_message: None,
        paused: false,
        auto_managed: true,
        activity: EngineActivity::Downloading,
        total_size: 1_000,
        completed_size: 0,
        total_wanted: 1_000,
        download_speed: 0,
        upload_speed: 0,
        total_downloaded: 0,
        total_uploaded: 0,
        num_seeds: 0,
        num_peers: 0,
        num_connections: 0,
    }
}

/// Parse the info-hash a [`seeded_magnet`] URI encodes, the same way a real
/// engine would resolve it from the magnet's `xt` parameter.
fn info_hash_from_magnet(uri: &str) -> anyhow::Result<InfoHash> {
    let digest = uri
        .split("btih:")
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("magnet URI has no btih parameter"))?;
    InfoHash::parse(digest).map_err(|err| anyhow::anyhow!(err))
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    async fn add_torrent_file(&self, path: &Path, _options: &AddOptions) -> anyhow::Result<EngineAddResult> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow::anyhow!("torrent file path has no usable stem"))?;
        let seed = stem.bytes().next().unwrap_or(0);
        Ok(self.admit(seeded_info_hash(seed)))
    }

    async fn add_magnet(&self, uri: &str, _options: &AddOptions) -> anyhow::Result<EngineAddResult> {
        let info_hash = info_hash_from_magnet(uri)?;
        Ok(self.admit(info_hash))
    }

    async fn add_from_resume(&self, resume_blob: &[u8], _save_path: &str) -> anyhow::Result<EngineAddResult> {
        let seed = resume_blob.first().copied().unwrap_or(0);
        Ok(self.admit(seeded_info_hash(seed)))
    }

    async fn remove(&self, handle: EngineHandle, _delete_files: bool) -> anyhow::Result<()> {
        self.state.statuses.lock().unwrap().remove(&handle.0);
        self.state.removed.lock().unwrap().push(handle);
        Ok(())
    }

    async fn pause(&self, handle: EngineHandle) {
        if let Some(status) = self.state.statuses.lock().unwrap().get_mut(&handle.0) {
            status.paused = true;
            status.auto_managed = false;
        }
    }

    async fn resume(&self, handle: EngineHandle) {
        if let Some(status) = self.state.statuses.lock().unwrap().get_mut(&handle.0) {
            status.paused = false;
            status.auto_managed = true;
        }
    }

    async fn force_resume(&self, handle: EngineHandle) {
        self.resume(handle).await;
    }

    async fn force_recheck(&self, _handle: EngineHandle) {}

    async fn force_reannounce(&self, _handle: EngineHandle) {}

    async fn set_speed_limit(&self, _handle: EngineHandle, _download_bps: u64, _upload_bps: u64) {}

    async fn queue_action(&self, _handle: EngineHandle, _position: QueuePosition) {}

    async fn set_sequential(&self, _handle: EngineHandle, _sequential: bool) {}

    async fn set_file_priority(&self, _handle: EngineHandle, _file_index: u32, _priority: FilePriority) {}

    async fn add_tracker(&self, _handle: EngineHandle, _url: &str) {}

    async fn remove_tracker(&self, _handle: EngineHandle, _url: &str) {}

    async fn request_magnet_uri(&self, handle: EngineHandle) -> Option<String> {
        let statuses = self.state.statuses.lock().unwrap();
        statuses.get(&handle.0).map(|status| format!("magnet:?xt=urn:btih:{}", status.name))
    }

    async fn pause_all(&self) {
        for status in self.state.statuses.lock().unwrap().values_mut() {
            status.paused = true;
            status.auto_managed = false;
        }
    }

    async fn resume_all(&self) {
        for status in self.state.statuses.lock().unwrap().values_mut() {
            status.paused = false;
            status.auto_managed = true;
        }
    }

    async fn apply_global_limits(&self, _download_bps: u64, _upload_bps: u64) {}

    async fn install_ip_deny_rule(&self, rule: IpDenyRule) {
        self.state.deny_rules.lock().unwrap().push(rule);
    }

    async fn request_save_resume(&self, handle: EngineHandle) {
        self.state
            .notifications
            .lock()
            .unwrap()
            .push(EngineNotification::SaveResumeOk(handle, vec![0xde, 0xad, 0xbe, 0xef]));
    }

    async fn poll_notifications(&self) -> Vec<EngineNotification> {
        std::mem::take(&mut self.state.notifications.lock().unwrap())
    }

    async fn capture_status(&self, handle: EngineHandle) -> Option<EngineStatusBundle> {
        self.state.statuses.lock().unwrap().get(&handle.0).cloned()
    }

    async fn capture_detail(&self, _handle: EngineHandle) -> Option<EngineDetailBundle> {
        Some(EngineDetailBundle::default())
    }

    async fn dht_node_count(&self) -> u32 {
        0
    }

    async fn session_rates(&self) -> (u64, u64) {
        let statuses = self.state.statuses.lock().unwrap();
        statuses.values().fold((0, 0), |(download, upload), status| {
            (download + status.download_speed, upload + status.upload_speed)
        })
    }

    async fn shutdown(&self) {
        *self.state.shutdown_called.lock().unwrap() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_and_reports_a_magnet() {
        let engine = FakeEngine::new();
        let added = engine
            .add_magnet(&seeded_magnet(7), &AddOptions::default())
            .await
            .unwrap();
        assert_eq!(added.info_hash, seeded_info_hash(7));
        let status = engine.capture_status(added.handle).await.unwrap();
        assert_eq!(status.activity, EngineActivity::Downloading);
    }

    #[tokio::test]
    async fn remove_clears_status_and_records_the_handle() {
        let engine = FakeEngine::new();
        let added = engine
            .add_magnet(&seeded_magnet(1), &AddOptions::default())
            .await
            .unwrap();
        engine.remove(added.handle, false).await.unwrap();
        assert!(engine.capture_status(added.handle).await.is_none());
        assert_eq!(engine.removed_handles(), vec![added.handle]);
    }

    #[tokio::test]
    async fn request_save_resume_queues_an_ok_notification() {
        let engine = FakeEngine::new();
        let added = engine
            .add_magnet(&seeded_magnet(2), &AddOptions::default())
            .await
            .unwrap();
        engine.request_save_resume(added.handle).await;
        let notifications = engine.poll_notifications().await;
        assert!(matches!(notifications.as_slice(), [EngineNotification::SaveResumeOk(h, _)] if *h == added.handle));
    }

    #[tokio::test]
    async fn shutdown_is_observable() {
        let engine = FakeEngine::new();
        assert!(!engine.was_shut_down());
        engine.shutdown().await;
        assert!(engine.was_shut_down());
    }
}
