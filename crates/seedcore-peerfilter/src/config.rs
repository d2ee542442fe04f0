use serde::{Deserialize, Serialize};

use crate::blocklist::IpRange;

/// A user-defined ban rule. `pattern` is tested two ways: as a literal
/// prefix against the peer-id, and (if it compiles as a regex) against the
/// client string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    /// Peer-id prefix or client-string regex to match.
    pub pattern: String,
    /// Reason recorded in the ban log and `PeerBanned` event.
    pub reason: String,
    /// Whether this rule is active.
    pub enabled: bool,
}

/// Full configuration for the peer filter, rebuilt from settings on
/// `Initialize` and every `ApplySettings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerFilterConfig {
    /// Master switch; when `false`, every peer is allowed.
    pub enabled: bool,
    /// Suppress or allow the built-in Xunlei-family rules.
    pub ban_xunlei: bool,
    /// Suppress or allow the built-in QQ-family rule.
    pub ban_qq: bool,
    /// Suppress or allow the built-in Baidu-family rule.
    pub ban_baidu: bool,
    /// User-authored additional rules.
    pub custom_rules: Vec<CustomRule>,
    /// Peer-id prefixes that bypass every ban rule.
    pub whitelist: Vec<String>,
    /// IP ranges to ban unconditionally.
    pub ip_blocklist: Vec<IpRange>,
}

impl Default for PeerFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ban_xunlei: true,
            ban_qq: true,
            ban_baidu: true,
            custom_rules: Vec::new(),
            whitelist: Vec::new(),
            ip_blocklist: Vec::new(),
        }
    }
}
