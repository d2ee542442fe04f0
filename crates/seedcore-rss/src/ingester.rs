use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use seedcore_core::ControllerHandle;
use seedcore_events::{Event, EventBus};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::warn;

use crate::config::FeedConfig;
use crate::error::RssError;
use crate::fetch::FetchPool;
use crate::history::FeedHistory;
use crate::item::{parse_feed, FeedItem};

/// Delay before a newly added feed's first fetch, so a burst of `add_feed`
/// calls at startup doesn't hammer every host in the same instant.
const WARMUP_DELAY: Duration = Duration::from_secs(2);

enum Msg {
    AddFeed(FeedConfig),
    RemoveFeed(String),
    Due(String),
    FetchDone { url: String, result: Result<Vec<u8>, RssError> },
    Shutdown(oneshot::Sender<()>),
}

/// Cheap, cloneable front door to a running [`RssIngester`].
#[derive(Clone)]
pub struct IngesterHandle {
    commands: mpsc::UnboundedSender<Msg>,
}

impl IngesterHandle {
    /// Subscribe (or re-subscribe) a feed. Any existing timer for the same
    /// URL is cancelled first, so re-adding a feed with a new interval or
    /// filter takes effect immediately.
    pub fn add_feed(&self, config: FeedConfig) {
        self.post(Msg::AddFeed(config));
    }

    /// Stop polling a feed. Its seen-items history is retained.
    pub fn remove_feed(&self, url: String) {
        self.post(Msg::RemoveFeed(url));
    }

    /// Cancel every feed timer, drain in-flight fetches best-effort, and
    /// close the history store. Awaits until shutdown has completed.
    pub async fn shutdown(&self) {
        let (ack, ack_rx) = oneshot::channel();
        self.post(Msg::Shutdown(ack));
        let _ = ack_rx.await;
    }

    fn post(&self, msg: Msg) {
        if self.commands.send(msg).is_err() {
            warn!("rss ingester command dropped: actor has already stopped");
        }
    }
}

struct FeedEntry {
    config: FeedConfig,
    timer: JoinHandle<()>,
}

/// Polls subscribed feeds on independent per-feed timers, parses and
/// filters their items, de-duplicates against a persistent history store,
/// and hands new matches to the session controller as `AddMagnet` or
/// `AddTorrentFile` commands.
///
/// Fetches for distinct feeds run concurrently (bounded by
/// [`FetchPool`]); parsing, filtering, de-duplication, and emission for a
/// single feed's results always happen serially inside this actor, so two
/// feeds can never race on the history store.
pub struct RssIngester {
    self_sender: mpsc::UnboundedSender<Msg>,
    commands: mpsc::UnboundedReceiver<Msg>,
    controller: ControllerHandle,
    events: EventBus,
    history: FeedHistory,
    fetch_pool: FetchPool,
    cache_dir: PathBuf,
    feeds: HashMap<String, FeedEntry>,
}

impl RssIngester {
    /// Open the feed history store at `data_dir/rss_history.db` and spawn
    /// the ingester actor.
    ///
    /// # Errors
    ///
    /// Returns [`RssError::HistoryOpen`] if the history store cannot be
    /// opened or created.
    pub async fn spawn(
        controller: ControllerHandle,
        events: EventBus,
        data_dir: PathBuf,
    ) -> Result<IngesterHandle, RssError> {
        let history = FeedHistory::open(&data_dir.join("rss_history.db")).await?;
        let fetch_pool = FetchPool::new()?;
        let cache_dir = data_dir.join("rss_cache");
        let (tx, rx) = mpsc::unbounded_channel();

        let ingester = Self {
            self_sender: tx.clone(),
            commands: rx,
            controller,
            events,
            history,
            fetch_pool,
            cache_dir,
            feeds: HashMap::new(),
        };
        tokio::spawn(ingester.run());
        Ok(IngesterHandle { commands: tx })
    }

    async fn run(mut self) {
        while let Some(msg) = self.commands.recv().await {
            match msg {
                Msg::AddFeed(config) => self.handle_add_feed(config),
                Msg::RemoveFeed(url) => self.handle_remove_feed(&url),
                Msg::Due(url) => self.handle_due(url),
                Msg::FetchDone { url, result } => self.handle_fetch_done(url, result).await,
                Msg::Shutdown(ack) => {
                    self.handle_shutdown().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }
    }

    fn handle_add_feed(&mut self, config: FeedConfig) {
        if let Some(previous) = self.feeds.remove(&config.url) {
            previous.timer.abort();
        }

        let url = config.url.clone();
        let enabled = config.enabled;
        let period = Duration::from_secs(u64::from(config.interval_minutes) * 60);
        let sender = self.self_sender.clone();
        let timer_url = url.clone();

        let timer = tokio::spawn(async move {
            if !enabled {
                return;
            }
            sleep(WARMUP_DELAY).await;
            if sender.send(Msg::Due(timer_url.clone())).is_err() {
                return;
            }
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sender.send(Msg::Due(timer_url.clone())).is_err() {
                    return;
                }
            }
        });

        self.feeds.insert(url, FeedEntry { config, timer });
    }

    fn handle_remove_feed(&mut self, url: &str) {
        if let Some(entry) = self.feeds.remove(url) {
            entry.timer.abort();
        }
    }

    fn handle_due(&mut self, url: String) {
        let Some(entry) = self.feeds.get(&url) else { return };
        if !entry.config.enabled {
            return;
        }
        let pool = self.fetch_pool.clone();
        let sender = self.self_sender.clone();
        let fetch_url = url.clone();
        tokio::spawn(async move {
            let result = pool.fetch(&fetch_url).await;
            let _ = sender.send(Msg::FetchDone { url: fetch_url, result });
        });
    }

    async fn handle_fetch_done(&mut self, url: String, result: Result<Vec<u8>, RssError>) {
        let Some(config) = self.feeds.get(&url).map(|entry| entry.config.clone()) else { return };

        let body = match result {
            Ok(body) => body,
            Err(err) => {
                self.events.publish(Event::FeedError { url: url.clone(), message: err.to_string() });
                return;
            }
        };

        let items = match parse_feed(&url, &body) {
            Ok(items) => items,
            Err(err) => {
                self.events.publish(Event::FeedError { url: url.clone(), message: err.to_string() });
                return;
            }
        };

        let total_items = items.len();
        let mut new_items = 0usize;

        for item in items {
            if !passes_filters(&item, &config) {
                continue;
            }

            let item_id = item.unique_id();
            match self.history.has_seen(&item_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(%url, %err, "failed to query feed history, skipping item");
                    continue;
                }
            }

            if let Err(err) = self.history.mark_seen(&item_id, &url, &item.title, chrono::Utc::now().timestamp()).await
            {
                warn!(%url, %err, "failed to record item as seen");
                continue;
            }
            new_items += 1;

            if config.auto_download {
                self.emit_item(&config, &item).await;
            }
        }

        self.events.publish(Event::FeedChecked { url, total_items, new_items });
    }

    async fn emit_item(&self, config: &FeedConfig, item: &FeedItem) {
        let save_path = save_path_override(config);
        if let Some(magnet) = &item.magnet {
            self.controller.add_magnet(magnet.clone(), save_path, config.category.clone(), Vec::new(), false);
            return;
        }
        let torrent_url = item
            .torrent_url
            .as_deref()
            .or_else(|| item.link.as_deref().filter(|link| link.ends_with(".torrent")));
        let Some(torrent_url) = torrent_url else { return };
        match self.fetch_pool.fetch(torrent_url).await {
            Ok(bytes) => match self.write_cache_file(torrent_url, &bytes).await {
                Ok(path) => {
                    self.controller.add_torrent_file(path, save_path, config.category.clone(), Vec::new(), false, false);
                }
                Err(err) => warn!(%torrent_url, %err, "failed to cache fetched .torrent file"),
            },
            Err(err) => warn!(%torrent_url, %err, "failed to fetch .torrent file"),
        }
    }

    async fn write_cache_file(&self, torrent_url: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let mut hasher = DefaultHasher::new();
        torrent_url.hash(&mut hasher);
        let path = self.cache_dir.join(format!("{:016x}.torrent", hasher.finish()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn handle_shutdown(&mut self) {
        for (_, entry) in self.feeds.drain() {
            entry.timer.abort();
        }
        self.history.close().await;
    }
}

fn save_path_override(config: &FeedConfig) -> Option<String> {
    if config.save_path.is_empty() {
        None
    } else {
        Some(config.save_path.clone())
    }
}

fn passes_filters(item: &FeedItem, config: &FeedConfig) -> bool {
    item.download_url().is_some()
        && include_passes(&config.include_pattern, &item.title)
        && !exclude_blocks(&config.exclude_pattern, &item.title)
}

fn include_passes(pattern: &Option<String>, title: &str) -> bool {
    match compile(pattern) {
        None => true,
        Some(Ok(regex)) => regex.is_match(title),
        Some(Err(err)) => {
            warn!(%err, "include_pattern failed to compile, treating feed as unfiltered");
            true
        }
    }
}

fn exclude_blocks(pattern: &Option<String>, title: &str) -> bool {
    match compile(pattern) {
        None => false,
        Some(Ok(regex)) => regex.is_match(title),
        Some(Err(err)) => {
            warn!(%err, "exclude_pattern failed to compile, treating feed as unfiltered");
            false
        }
    }
}

fn compile(pattern: &Option<String>) -> Option<Result<Regex, regex::Error>> {
    match pattern {
        None => None,
        Some(pattern) if pattern.is_empty() => None,
        Some(pattern) => Some(Regex::new(pattern)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, magnet: Option<&str>) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            magnet: magnet.map(str::to_string),
            ..FeedItem::default()
        }
    }

    fn feed(include: Option<&str>, exclude: Option<&str>) -> FeedConfig {
        FeedConfig::new(
            "https://example.com/feed".to_string(),
            "Movies Feed".to_string(),
            "Movies".to_string(),
            String::new(),
            include.map(str::to_string),
            exclude.map(str::to_string),
            30,
            true,
            true,
        )
    }

    #[test]
    fn item_without_a_download_url_never_passes() {
        let item = item("Anything", None);
        assert!(!passes_filters(&item, &feed(None, None)));
    }

    #[test]
    fn item_with_only_a_torrent_link_passes() {
        let item = FeedItem {
            title: "Linux ISO".to_string(),
            link: Some("https://example.com/linux.torrent".to_string()),
            ..FeedItem::default()
        };
        assert!(passes_filters(&item, &feed(None, None)));
    }

    #[test]
    fn include_pattern_restricts_matches() {
        let config = feed(Some("1080p"), None);
        assert!(passes_filters(&item("Movie.1080p.mkv", Some("magnet:?xt=urn:btih:a")), &config));
        assert!(!passes_filters(&item("Movie.720p.mkv", Some("magnet:?xt=urn:btih:a")), &config));
    }

    #[test]
    fn exclude_pattern_blocks_matches() {
        let config = feed(None, Some("CAM"));
        assert!(!passes_filters(&item("Movie.CAM.mkv", Some("magnet:?xt=urn:btih:a")), &config));
        assert!(passes_filters(&item("Movie.WEB.mkv", Some("magnet:?xt=urn:btih:a")), &config));
    }

    #[test]
    fn malformed_pattern_degrades_instead_of_rejecting_every_item() {
        let config = feed(Some("("), None);
        assert!(passes_filters(&item("anything", Some("magnet:?xt=urn:btih:a")), &config));
    }

    #[test]
    fn save_path_override_is_none_for_empty_string() {
        let config = feed(None, None);
        assert_eq!(save_path_override(&config), None);
    }

    #[tokio::test]
    async fn emitting_a_magnet_item_reaches_the_session_controller() {
        use seedcore_core::SessionController;
        use seedcore_events::Event;
        use seedcore_testkit::FakeEngine;
        use std::sync::Arc;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let events = EventBus::new();
        let controller = SessionController::spawn(Arc::new(FakeEngine::new()), dir.path().to_path_buf(), events.clone());
        let mut stream = events.subscribe(None);
        controller.initialize(seedcore_core::SettingsSnapshot {
            default_save_path: String::new(),
            max_download_speed: 0,
            max_upload_speed: 0,
            on_complete_action: 0,
            max_ratio: 0.0,
            ratio_action: 0,
            peer_filter_enabled: false,
            ban_xunlei: false,
            ban_qq: false,
            ban_baidu: false,
            ip_blocklist_path: String::new(),
            bandwidth_schedule: seedcore_core::BandwidthSchedule::default(),
        });
        assert!(matches!(stream.recv().await.unwrap().event, Event::Started));

        let history = FeedHistory::open(&dir.path().join("rss_history.db")).await.unwrap();
        let fetch_pool = FetchPool::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let ingester = RssIngester {
            self_sender: tx,
            commands: rx,
            controller,
            events,
            history,
            fetch_pool,
            cache_dir: dir.path().join("rss_cache"),
            feeds: HashMap::new(),
        };

        let config = feed(None, None);
        let magnet = format!("magnet:?xt=urn:btih:{}", "b".repeat(40));
        ingester.emit_item(&config, &item("Linux ISO", Some(&magnet))).await;

        assert!(matches!(stream.recv().await.unwrap().event, Event::TorrentAdded { .. }));
    }
}
