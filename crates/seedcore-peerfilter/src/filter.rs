use std::collections::VecDeque;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PeerFilterConfig;

const BAN_LOG_CAPACITY: usize = 500;

struct BuiltinPrefixRule {
    prefix: &'static str,
    category: Category,
    reason: &'static str,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Category {
    Xunlei,
    Qq,
    Baidu,
    Independent,
}

const BUILTIN_PREFIX_RULES: &[BuiltinPrefixRule] = &[
    BuiltinPrefixRule { prefix: "-XL", category: Category::Xunlei, reason: "Xunlei peer-id prefix" },
    BuiltinPrefixRule { prefix: "-SD", category: Category::Xunlei, reason: "Xunlei peer-id prefix" },
    BuiltinPrefixRule { prefix: "-DL", category: Category::Xunlei, reason: "Xunlei peer-id prefix" },
    BuiltinPrefixRule { prefix: "-QD", category: Category::Qq, reason: "QQ peer-id prefix" },
    BuiltinPrefixRule { prefix: "-BN", category: Category::Baidu, reason: "Baidu peer-id prefix" },
    BuiltinPrefixRule { prefix: "-XF", category: Category::Independent, reason: "known-abusive peer-id prefix" },
    BuiltinPrefixRule { prefix: "-TS", category: Category::Independent, reason: "known-abusive peer-id prefix" },
    BuiltinPrefixRule { prefix: "-FG", category: Category::Independent, reason: "known-abusive peer-id prefix" },
    BuiltinPrefixRule { prefix: "-TT", category: Category::Independent, reason: "known-abusive peer-id prefix" },
];

const BUILTIN_CLIENT_PATTERNS: &[(&str, &str)] = &[
    ("(?i)xunlei", "Xunlei client string"),
    ("(?i)thunder", "Thunder client string"),
    ("(?i)qqdownload", "QQDownload client string"),
    (r"7\.\d+\.\d+\.\d+", "known-abusive client version string"),
];

/// Outcome of a peer-filter decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The peer may connect.
    Allow,
    /// The peer should be banned, with a human-readable reason.
    Ban {
        /// Why the ban rule matched.
        reason: String,
    },
}

/// One entry in the in-memory ban log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanLogEntry {
    /// When the ban was recorded.
    pub timestamp: DateTime<Utc>,
    /// Banned peer's IP address.
    pub ip: String,
    /// Peer's self-reported client string.
    pub client: String,
    /// Reason the ban rule matched.
    pub reason: String,
}

/// Stateful peer filter: holds the active configuration, pre-compiled
/// client-name patterns, and a bounded ban log.
pub struct PeerFilter {
    config: PeerFilterConfig,
    client_patterns: Vec<(Regex, &'static str)>,
    ban_log: VecDeque<BanLogEntry>,
}

impl PeerFilter {
    /// Build a filter from the given configuration.
    #[must_use]
    pub fn new(config: PeerFilterConfig) -> Self {
        let client_patterns = BUILTIN_CLIENT_PATTERNS
            .iter()
            .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, *reason)))
            .collect();
        Self {
            config,
            client_patterns,
            ban_log: VecDeque::with_capacity(BAN_LOG_CAPACITY),
        }
    }

    /// Replace the active configuration, as happens on `ApplySettings`.
    pub fn reconfigure(&mut self, config: PeerFilterConfig) {
        self.config = config;
    }

    /// Read-only access to the active configuration, so a caller
    /// reconfiguring on `ApplySettings` can carry forward fields the new
    /// settings snapshot doesn't itself own (custom rules, whitelist).
    #[must_use]
    pub const fn config(&self) -> &PeerFilterConfig {
        &self.config
    }

    /// Read-only access to the ban log, oldest first.
    #[must_use]
    pub fn ban_log(&self) -> &VecDeque<BanLogEntry> {
        &self.ban_log
    }

    /// Decide whether a newly connected peer should be banned.
    pub fn decide(&mut self, peer_id_prefix: &[u8], client: &str, ip: Ipv4Addr) -> Decision {
        if !self.config.enabled {
            return Decision::Allow;
        }

        if self
            .config
            .whitelist
            .iter()
            .any(|entry| peer_id_prefix.starts_with(entry.as_bytes()))
        {
            return Decision::Allow;
        }

        if let Some(reason) = self.builtin_prefix_match(peer_id_prefix) {
            return self.record_ban(ip, client, reason);
        }

        if let Some(reason) = self.client_pattern_match(client) {
            return self.record_ban(ip, client, reason.to_string());
        }

        if let Some(reason) = self.custom_rule_match(peer_id_prefix, client) {
            return self.record_ban(ip, client, reason);
        }

        if self.config.ip_blocklist.iter().any(|range| range.contains(ip)) {
            return self.record_ban(ip, client, "IP blocklist".to_string());
        }

        Decision::Allow
    }

    fn builtin_prefix_match(&self, peer_id_prefix: &[u8]) -> Option<String> {
        BUILTIN_PREFIX_RULES
            .iter()
            .filter(|rule| self.category_enabled(rule.category))
            .find(|rule| peer_id_prefix.starts_with(rule.prefix.as_bytes()))
            .map(|rule| rule.reason.to_string())
    }

    const fn category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Xunlei => self.config.ban_xunlei,
            Category::Qq => self.config.ban_qq,
            Category::Baidu => self.config.ban_baidu,
            Category::Independent => true,
        }
    }

    fn client_pattern_match(&self, client: &str) -> Option<&'static str> {
        self.client_patterns
            .iter()
            .find(|(re, _)| re.is_match(client))
            .map(|(_, reason)| *reason)
    }

    fn custom_rule_match(&self, peer_id_prefix: &[u8], client: &str) -> Option<String> {
        for rule in &self.config.custom_rules {
            if !rule.enabled {
                continue;
            }
            let prefix_match = peer_id_prefix.starts_with(rule.pattern.as_bytes());
            let client_match = Regex::new(&rule.pattern)
                .map(|re| re.is_match(client))
                .unwrap_or(false);
            if prefix_match || client_match {
                return Some(rule.reason.clone());
            }
        }
        None
    }

    fn record_ban(&mut self, ip: Ipv4Addr, client: &str, reason: String) -> Decision {
        if self.ban_log.len() == BAN_LOG_CAPACITY {
            self.ban_log.pop_front();
        }
        self.ban_log.push_back(BanLogEntry {
            timestamp: Utc::now(),
            ip: ip.to_string(),
            client: client.to_string(),
            reason: reason.clone(),
        });
        info!(%ip, %reason, "banning peer");
        Decision::Ban { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::IpRange;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn disabled_filter_always_allows() {
        let mut filter = PeerFilter::new(PeerFilterConfig {
            enabled: false,
            ..PeerFilterConfig::default()
        });
        let decision = filter.decide(b"-XL1234-", "Xunlei/1.0", ip(1, 2, 3, 4));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn whitelist_beats_builtin_rule() {
        let mut filter = PeerFilter::new(PeerFilterConfig {
            whitelist: vec!["-XL1234-".to_string()],
            ..PeerFilterConfig::default()
        });
        let decision = filter.decide(b"-XL1234-", "Xunlei/1.0", ip(1, 2, 3, 4));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn builtin_xunlei_prefix_is_banned() {
        let mut filter = PeerFilter::new(PeerFilterConfig::default());
        let decision = filter.decide(b"-XL1234-", "some client", ip(1, 2, 3, 4));
        assert!(matches!(decision, Decision::Ban { .. }));
        assert_eq!(filter.ban_log().len(), 1);
    }

    #[test]
    fn category_flag_suppresses_builtin_rule() {
        let mut filter = PeerFilter::new(PeerFilterConfig {
            ban_xunlei: false,
            ..PeerFilterConfig::default()
        });
        let decision = filter.decide(b"-XL1234-", "plain client", ip(1, 2, 3, 4));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn client_name_pattern_bans_regardless_of_prefix() {
        let mut filter = PeerFilter::new(PeerFilterConfig::default());
        let decision = filter.decide(b"-qB4500-", "Thunder 9000", ip(5, 5, 5, 5));
        assert!(matches!(decision, Decision::Ban { .. }));
    }

    #[test]
    fn non_matching_peer_is_allowed() {
        let mut filter = PeerFilter::new(PeerFilterConfig::default());
        let decision = filter.decide(b"-qB4500-", "qBittorrent/4.5.0", ip(5, 5, 5, 5));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn ip_blocklist_bans_when_nothing_else_matches() {
        let mut filter = PeerFilter::new(PeerFilterConfig {
            ip_blocklist: vec![IpRange {
                description: "test".to_string(),
                start: ip(9, 9, 9, 0),
                end: ip(9, 9, 9, 255),
            }],
            ..PeerFilterConfig::default()
        });
        let decision = filter.decide(b"-qB4500-", "qBittorrent/4.5.0", ip(9, 9, 9, 42));
        assert_eq!(decision, Decision::Ban { reason: "IP blocklist".to_string() });
    }

    #[test]
    fn ban_log_evicts_oldest_past_capacity() {
        let mut filter = PeerFilter::new(PeerFilterConfig::default());
        for i in 0..(BAN_LOG_CAPACITY + 10) {
            let octet = u8::try_from(i % 256).unwrap();
            filter.decide(b"-XL1234-", "client", ip(10, 0, 0, octet));
        }
        assert_eq!(filter.ban_log().len(), BAN_LOG_CAPACITY);
    }
}
