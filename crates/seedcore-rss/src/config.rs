use serde::{Deserialize, Serialize};

/// Shortest interval a feed can be polled at; requests below this are
/// clamped up rather than rejected, since a too-eager poll interval is a
/// configuration mistake, not a reason to refuse the feed entirely.
pub const MIN_INTERVAL_MINUTES: u32 = 5;

/// Longest interval a feed can be polled at; requests above this are
/// clamped down so a stale feed still gets checked at least once a day.
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// A single subscribed RSS 2.0 or Atom 1.0 feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed URL to poll.
    pub url: String,
    /// Display name shown in feed lists; purely cosmetic.
    pub name: String,
    /// Category assigned to torrents this feed adds.
    pub category: String,
    /// Save path override for torrents this feed adds; empty uses the
    /// session default.
    pub save_path: String,
    /// Only items whose title matches this regex (if non-empty) are kept.
    pub include_pattern: Option<String>,
    /// Items whose title matches this regex (if non-empty) are dropped.
    pub exclude_pattern: Option<String>,
    /// Poll interval in minutes; clamped to at least
    /// [`MIN_INTERVAL_MINUTES`] on construction.
    pub interval_minutes: u32,
    /// Whether this feed is currently polled at all.
    pub enabled: bool,
    /// Whether matching items are automatically added as torrents, or
    /// merely recorded as seen.
    pub auto_download: bool,
}

impl FeedConfig {
    /// Build a feed config, clamping `interval_minutes` into
    /// [`MIN_INTERVAL_MINUTES`, [`MAX_INTERVAL_MINUTES`]] if it was
    /// requested outside that range.
    #[must_use]
    pub fn new(
        url: String,
        name: String,
        category: String,
        save_path: String,
        include_pattern: Option<String>,
        exclude_pattern: Option<String>,
        interval_minutes: u32,
        enabled: bool,
        auto_download: bool,
    ) -> Self {
        Self {
            url,
            name,
            category,
            save_path,
            include_pattern,
            exclude_pattern,
            interval_minutes: interval_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES),
            enabled,
            auto_download,
        }
    }
}
