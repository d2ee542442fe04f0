use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

use crate::info_hash::InfoHash;
use crate::snapshot::{DetailData, SessionStats};

/// Sequential identifier assigned to each event published on the bus.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed events published by the session controller and RSS ingester.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The controller finished initialization and is ready to accept commands.
    Started,
    /// The controller has fully shut down.
    Stopped,
    /// A torrent was successfully registered.
    TorrentAdded {
        /// Identity of the newly added torrent.
        info_hash: InfoHash,
    },
    /// An `AddTorrentFile` or `AddMagnet` command could not be satisfied.
    AddFailed {
        /// Human-readable reason the add failed.
        reason: String,
    },
    /// A torrent was removed from the session.
    TorrentRemoved {
        /// Identity of the removed torrent.
        info_hash: InfoHash,
    },
    /// A torrent finished downloading its payload.
    TorrentFinished {
        /// Identity of the finished torrent.
        info_hash: InfoHash,
    },
    /// A torrent hit an unrecoverable engine error.
    TorrentError {
        /// Identity of the torrent that errored.
        info_hash: InfoHash,
        /// Engine-reported error detail.
        message: String,
    },
    /// Metadata (file list, piece layout) became available for a magnet.
    MetadataReceived {
        /// Identity of the torrent whose metadata arrived.
        info_hash: InfoHash,
    },
    /// A new session-wide statistics snapshot is available.
    StatsUpdated(SessionStats),
    /// A new detail view is available for the currently focused torrent.
    DetailUpdated(DetailData),
    /// A peer was banned by the peer filter.
    PeerBanned {
        /// Banned peer's IP address.
        address: String,
        /// Reason the ban rule matched.
        reason: String,
    },
    /// A magnet URI was generated in response to `RequestMagnetUri`.
    MagnetUriReady {
        /// Identity of the torrent the URI was generated for.
        info_hash: InfoHash,
        /// The generated magnet URI.
        uri: String,
    },
    /// An RSS feed finished a fetch/parse/filter cycle.
    FeedChecked {
        /// Feed URL that was checked.
        url: String,
        /// Total items found in the feed.
        total_items: usize,
        /// Items that were new (not previously seen) and passed filtering.
        new_items: usize,
    },
    /// An RSS feed fetch or parse failed.
    FeedError {
        /// Feed URL that failed.
        url: String,
        /// Human-readable failure detail.
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator, stable across releases.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::TorrentAdded { .. } => "torrent_added",
            Self::AddFailed { .. } => "add_failed",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentError { .. } => "torrent_error",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::StatsUpdated(_) => "stats_updated",
            Self::DetailUpdated(_) => "detail_updated",
            Self::PeerBanned { .. } => "peer_banned",
            Self::MagnetUriReady { .. } => "magnet_uri_ready",
            Self::FeedChecked { .. } => "feed_checked",
            Self::FeedError { .. } => "feed_error",
        }
    }
}

/// Metadata wrapper assigning each event a sequential id and timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Time the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Broadcast event bus with a bounded in-memory replay buffer, so a
/// subscriber that reconnects can ask for everything published since a
/// given id instead of missing events emitted while it was detached.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a bus whose broadcast channel and replay buffer both hold
    /// `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default replay buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, assigning it the next sequential id.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than
    /// `since_id` before live events arrive. `None` replays the entire
    /// buffer.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        let threshold = since_id.unwrap_or(0);
        {
            let buffer = self.lock_buffer();
            for item in &*buffer {
                if item.id > threshold {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return buffered events newer than `since_id` without subscribing.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer.iter().filter(|item| item.id > since_id).cloned().collect()
    }

    /// Return the most recently assigned event id, if any event has been
    /// published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper yielding replayed backlog events before live ones.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, draining the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_hash(seed: u8) -> InfoHash {
        InfoHash::parse(&hex::encode([seed; 20])).expect("valid test hash")
    }

    mod hex {
        pub(super) fn encode(bytes: [u8; 20]) -> String {
            bytes.iter().map(|b| format!("{b:02x}")).collect()
        }
    }

    fn sample_event(seed: u8) -> Event {
        Event::TorrentAdded {
            info_hash: sample_hash(seed),
        }
    }

    #[test]
    fn event_kinds_cover_all_variants() {
        let info_hash = sample_hash(1);
        let events = [
            Event::Started,
            Event::Stopped,
            Event::TorrentAdded { info_hash },
            Event::AddFailed {
                reason: "bad magnet".to_string(),
            },
            Event::TorrentRemoved { info_hash },
            Event::TorrentFinished { info_hash },
            Event::TorrentError {
                info_hash,
                message: "disk error".to_string(),
            },
            Event::MetadataReceived { info_hash },
            Event::PeerBanned {
                address: "10.0.0.1".to_string(),
                reason: "blocklist".to_string(),
            },
            Event::MagnetUriReady {
                info_hash,
                uri: "magnet:?xt=urn:btih:abc".to_string(),
            },
            Event::FeedChecked {
                url: "https://example.com/feed".to_string(),
                total_items: 10,
                new_items: 2,
            },
            Event::FeedError {
                url: "https://example.com/feed".to_string(),
                message: "timeout".to_string(),
            },
        ];

        let expected = [
            "started",
            "stopped",
            "torrent_added",
            "add_failed",
            "torrent_removed",
            "torrent_finished",
            "torrent_error",
            "metadata_received",
            "peer_banned",
            "magnet_uri_ready",
            "feed_checked",
            "feed_error",
        ];

        for (event, kind) in events.iter().zip(expected) {
            assert_eq!(event.kind(), kind);
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                for i in 0..500_u16 {
                    let publish_bus = bus.clone();
                    let seed = u8::try_from(i % 256).unwrap();
                    timeout(PUBLISH_TIMEOUT, async move {
                        let _ = publish_bus.publish(sample_event(seed));
                    })
                    .await
                    .expect("publish timed out");
                }
            })
        };

        let consumer = task::spawn(async move {
            let mut ids = HashSet::new();
            while ids.len() < 500 {
                if let Some(event) = stream.next().await {
                    ids.insert(event.id);
                }
            }
            ids
        });

        publisher.await.expect("publisher task panicked");
        let ids = consumer.await.expect("consumer task panicked");
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none(), "no events published yet");
        let published = bus.publish(sample_event(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn subscribe_without_since_replays_all() {
        let bus = EventBus::with_capacity(4);
        for i in 0..3 {
            let _ = bus.publish(sample_event(i));
        }
        let mut stream = bus.subscribe(None);
        let mut collected = Vec::new();
        for expected_id in 1..=3 {
            collected.push(
                timeout(PUBLISH_TIMEOUT, stream.next())
                    .await
                    .expect("stream stalled")
                    .expect("stream closed"),
            );
            assert_eq!(collected.last().unwrap().id, expected_id);
        }
        assert_eq!(collected.len(), 3);
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(
            stream.next().await.is_none(),
            "closing the sender should end the stream"
        );
    }
}
