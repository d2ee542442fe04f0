use serde_json::{json, Value};

/// Every key with a declared default, covering the core session settings
/// plus the supplemented proxy/tracker-list keys. Used to seed
/// `get_all`'s merge.
pub(crate) const DECLARED_KEYS: &[&str] = &[
    "listen_port",
    "upnp_enabled",
    "natpmp_enabled",
    "dht_enabled",
    "pex_enabled",
    "lsd_enabled",
    "encryption_mode",
    "max_download_speed",
    "max_upload_speed",
    "max_connections",
    "max_connections_per_torrent",
    "max_uploads",
    "max_uploads_per_torrent",
    "max_active_downloads",
    "max_active_uploads",
    "max_active_torrents",
    "on_complete_action",
    "max_ratio",
    "max_seed_time_minutes",
    "ratio_action",
    "default_save_path",
    "temp_path_enabled",
    "temp_path",
    "move_completed_enabled",
    "move_completed_path",
    "peer_filter_enabled",
    "auto_ban_xunlei",
    "auto_ban_qq",
    "auto_ban_baidu",
    "ip_blocklist_path",
    "bandwidth_schedule",
    "proxy_type",
    "proxy_host",
    "proxy_port",
    "proxy_auth",
    "proxy_user",
    "proxy_pass",
    "auto_update_trackers",
    "tracker_list_url",
];

/// Return the declared default for `key`, or `None` if `key` is not a
/// recognized setting.
#[must_use]
pub fn declared_default(key: &str) -> Option<Value> {
    Some(match key {
        "listen_port" => json!(6881),
        "upnp_enabled" | "natpmp_enabled" | "dht_enabled" | "pex_enabled" | "lsd_enabled" => {
            json!(true)
        }
        "encryption_mode" => json!(1),
        "max_download_speed" => json!(0),
        "max_upload_speed" => json!(13312),
        "max_connections" => json!(500),
        "max_connections_per_torrent" => json!(100),
        "max_uploads" => json!(20),
        "max_uploads_per_torrent" => json!(5),
        "max_active_downloads" | "max_active_uploads" => json!(5),
        "max_active_torrents" => json!(10),
        "on_complete_action" => json!(1),
        "max_ratio" => json!(2.0),
        "max_seed_time_minutes" => json!(0),
        "ratio_action" => json!(0),
        "default_save_path" => json!(default_download_dir()),
        "temp_path_enabled" | "move_completed_enabled" => json!(false),
        "temp_path" | "move_completed_path" | "ip_blocklist_path" => json!(""),
        "peer_filter_enabled" | "auto_ban_xunlei" | "auto_ban_qq" | "auto_ban_baidu" => json!(true),
        "bandwidth_schedule" => json!({"enabled": false, "rules": []}),
        "proxy_type" => json!(0),
        "proxy_host" => json!(""),
        "proxy_port" => json!(0),
        "proxy_auth" => json!(false),
        "proxy_user" | "proxy_pass" => json!(""),
        "auto_update_trackers" => json!(false),
        "tracker_list_url" => {
            json!("https://raw.githubusercontent.com/ngosang/trackerslist/master/trackers_best.txt")
        }
        _ => return None,
    })
}

fn default_download_dir() -> String {
    std::env::var("HOME")
        .map(|home| format!("{home}/Downloads"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_resolve_defaults() {
        assert_eq!(declared_default("listen_port"), Some(json!(6881)));
        assert_eq!(declared_default("max_upload_speed"), Some(json!(13312)));
        assert_eq!(
            declared_default("bandwidth_schedule"),
            Some(json!({"enabled": false, "rules": []}))
        );
    }

    #[test]
    fn unknown_key_has_no_declared_default() {
        assert_eq!(declared_default("not_a_real_setting"), None);
    }
}
