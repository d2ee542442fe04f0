use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::reader::Reader;

use crate::error::RssError;

/// One entry extracted from a parsed RSS 2.0 `<item>` or Atom 1.0
/// `<entry>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedItem {
    /// Item title, used against a feed's include/exclude patterns.
    pub title: String,
    /// Human-facing page link, if present.
    pub link: Option<String>,
    /// Stable identity: RSS `guid` or Atom `id`, falling back to `link`.
    pub guid: Option<String>,
    /// Publication timestamp, if the feed supplied one.
    pub pub_date: Option<DateTime<Utc>>,
    /// Direct `.torrent` download URL, if the feed supplied one.
    pub torrent_url: Option<String>,
    /// Magnet URI, if the feed supplied one.
    pub magnet: Option<String>,
    /// Payload size in bytes, if the feed supplied one.
    pub size: Option<u64>,
}

impl FeedItem {
    /// The identity used for de-duplication: `guid` when present, else a
    /// deterministic hash of `title`, `link`, and `magnet` together (so a
    /// feed that omits `guid` still dedupes stably across polls without
    /// depending on any single field being present).
    #[must_use]
    pub fn unique_id(&self) -> String {
        match &self.guid {
            Some(guid) => guid.clone(),
            None => content_hash(&self.title, self.link.as_deref(), self.magnet.as_deref()),
        }
    }

    /// The URL the controller should add as a torrent: a magnet URI is
    /// preferred over a direct `.torrent` download, since it needs no
    /// extra fetch. Falling back further, a plain `link` ending `.torrent`
    /// is itself a valid download reference when no enclosure or magnet
    /// was supplied.
    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        self.magnet
            .as_deref()
            .or(self.torrent_url.as_deref())
            .or_else(|| self.link.as_deref().filter(|link| link.ends_with(".torrent")))
    }
}

/// Deterministic 32-hex-digit identity for an item lacking a `guid`,
/// derived from its other fields. Two independently-seeded hash passes
/// over the same content keep the combined digest from collapsing to a
/// single 64-bit hash's worth of entropy.
fn content_hash(title: &str, link: Option<&str>, magnet: Option<&str>) -> String {
    let mut high = DefaultHasher::new();
    0xa5a5_a5a5_a5a5_a5a5u64.hash(&mut high);
    title.hash(&mut high);
    link.hash(&mut high);
    magnet.hash(&mut high);

    let mut low = DefaultHasher::new();
    0x5a5a_5a5a_5a5a_5a5au64.hash(&mut low);
    magnet.hash(&mut low);
    link.hash(&mut low);
    title.hash(&mut low);

    format!("{:016x}{:016x}", high.finish(), low.finish())
}

/// Parse a feed body as RSS 2.0 or Atom 1.0, detected by whichever item
/// elements (`<item>` vs `<entry>`) actually occur in the document.
///
/// An unrecognized body yields an empty list rather than an error: a feed
/// that briefly serves malformed or empty XML shouldn't abort the whole
/// ingester, just produce nothing new this cycle.
///
/// # Errors
///
/// Returns [`RssError::Parse`] if the XML itself is not well-formed.
pub fn parse_feed(url: &str, bytes: &[u8]) -> Result<Vec<FeedItem>, RssError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Eof) => break,
            Ok(XmlEvent::Start(start)) => {
                let name = local_name(&start);
                match name.as_str() {
                    "item" => items.push(parse_rss_item(&mut reader, url)?),
                    "entry" => items.push(parse_atom_entry(&mut reader, url)?),
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                return Err(RssError::Parse { url: url.to_string(), reason: err.to_string() });
            }
        }
        buf.clear();
    }

    Ok(items)
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attr_value(start: &BytesStart, key: &[u8]) -> Option<String> {
    start
        .attributes()
        .filter_map(Result::ok)
        .find(|attribute| attribute.key.as_ref() == key)
        .and_then(|attribute| attribute.unescape_value().ok().map(|value| value.into_owned()))
}

fn parse_rss_item(reader: &mut Reader<&[u8]>, url: &str) -> Result<FeedItem, RssError> {
    let mut item = FeedItem::default();
    let mut depth = 1u32;
    let mut current = String::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(start)) => {
                depth += 1;
                let name = local_name(&start);
                if name == "enclosure" {
                    apply_enclosure(&start, &mut item);
                }
                current = name;
                text.clear();
            }
            Ok(XmlEvent::Empty(start)) => {
                let name = local_name(&start);
                if name == "enclosure" {
                    apply_enclosure(&start, &mut item);
                }
            }
            Ok(XmlEvent::Text(bytes_text)) => {
                if let Ok(decoded) = bytes_text.unescape() {
                    text.push_str(&decoded);
                }
            }
            Ok(XmlEvent::End(end)) => {
                depth -= 1;
                let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                if name == "item" && depth == 0 {
                    break;
                }
                apply_rss_field(&name, text.trim(), &mut item);
                current.clear();
                text.clear();
            }
            Ok(XmlEvent::Eof) => {
                return Err(RssError::Parse {
                    url: url.to_string(),
                    reason: "unexpected end of document inside <item>".to_string(),
                });
            }
            Ok(_) => {}
            Err(err) => {
                return Err(RssError::Parse { url: url.to_string(), reason: err.to_string() });
            }
        }
        buf.clear();
    }
    let _ = current;

    promote_magnet_link(&mut item);
    if item.guid.is_none() {
        item.guid = item.link.clone();
    }
    Ok(item)
}

fn apply_rss_field(name: &str, text: &str, item: &mut FeedItem) {
    match name {
        "title" => item.title = text.to_string(),
        "link" => item.link = Some(text.to_string()),
        "guid" => item.guid = Some(text.to_string()),
        "pubDate" => item.pub_date = DateTime::parse_from_rfc2822(text).ok().map(|dt| dt.with_timezone(&Utc)),
        "magnetURI" => item.magnet = Some(text.to_string()),
        _ => {
            if item.magnet.is_none() && text.starts_with("magnet:") {
                item.magnet = Some(text.to_string());
            }
        }
    }
}

fn apply_enclosure(start: &BytesStart, item: &mut FeedItem) {
    let url = attr_value(start, b"url");
    let kind = attr_value(start, b"type");
    let is_torrent = kind.as_deref().is_some_and(|k| k.contains("torrent"))
        || url.as_deref().is_some_and(|u| u.ends_with(".torrent"));
    if is_torrent {
        item.torrent_url = url;
    }
    if let Some(length) = attr_value(start, b"length") {
        item.size = length.parse().ok();
    }
}

fn promote_magnet_link(item: &mut FeedItem) {
    if item.magnet.is_none() {
        if let Some(link) = &item.link {
            if link.starts_with("magnet:") {
                item.magnet = Some(link.clone());
            }
        }
    }
}

fn parse_atom_entry(reader: &mut Reader<&[u8]>, url: &str) -> Result<FeedItem, RssError> {
    let mut item = FeedItem::default();
    let mut depth = 1u32;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(start)) => {
                depth += 1;
                let name = local_name(&start);
                if name == "link" {
                    apply_atom_link(&start, &mut item);
                }
                text.clear();
            }
            Ok(XmlEvent::Empty(start)) => {
                if local_name(&start) == "link" {
                    apply_atom_link(&start, &mut item);
                }
            }
            Ok(XmlEvent::Text(bytes_text)) => {
                if let Ok(decoded) = bytes_text.unescape() {
                    text.push_str(&decoded);
                }
            }
            Ok(XmlEvent::End(end)) => {
                depth -= 1;
                let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                if name == "entry" && depth == 0 {
                    break;
                }
                apply_atom_field(&name, text.trim(), &mut item);
                text.clear();
            }
            Ok(XmlEvent::Eof) => {
                return Err(RssError::Parse {
                    url: url.to_string(),
                    reason: "unexpected end of document inside <entry>".to_string(),
                });
            }
            Ok(_) => {}
            Err(err) => {
                return Err(RssError::Parse { url: url.to_string(), reason: err.to_string() });
            }
        }
        buf.clear();
    }

    Ok(item)
}

fn apply_atom_field(name: &str, text: &str, item: &mut FeedItem) {
    match name {
        "title" => item.title = text.to_string(),
        "id" => item.guid = Some(text.to_string()),
        "updated" => item.pub_date = DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.with_timezone(&Utc)),
        "published" if item.pub_date.is_none() => {
            item.pub_date = DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.with_timezone(&Utc));
        }
        _ => {}
    }
}

fn apply_atom_link(start: &BytesStart, item: &mut FeedItem) {
    let Some(href) = attr_value(start, b"href") else { return };
    let rel = attr_value(start, b"rel");
    let kind = attr_value(start, b"type");

    if href.starts_with("magnet:") {
        item.magnet = Some(href);
    } else if href.ends_with(".torrent") || kind.as_deref().is_some_and(|k| k.contains("torrent")) {
        item.torrent_url = Some(href);
    } else if rel.as_deref().is_none_or(|rel| rel == "alternate") {
        item.link = Some(href);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Demo Feed</title>
<item>
  <title>Ubuntu 24.04 ISO</title>
  <link>https://example.com/ubuntu</link>
  <guid>urn:uuid:1234</guid>
  <pubDate>Tue, 01 Jul 2025 10:00:00 GMT</pubDate>
  <enclosure url="https://example.com/ubuntu.torrent" type="application/x-bittorrent" length="4096"/>
</item>
<item>
  <title>Magnet-only release</title>
  <link>https://example.com/page</link>
  <magnetURI>magnet:?xt=urn:btih:abc123</magnetURI>
</item>
</channel></rss>"#;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>Demo Atom Feed</title>
<entry>
  <title>Debian netinst</title>
  <id>tag:example.com,2025:1</id>
  <updated>2025-07-01T10:00:00Z</updated>
  <link rel="alternate" href="https://example.com/debian"/>
  <link href="https://example.com/debian.torrent" type="application/x-bittorrent"/>
</entry>
<entry>
  <title>Magnet entry</title>
  <id>tag:example.com,2025:2</id>
  <published>2025-07-02T10:00:00Z</published>
  <link href="magnet:?xt=urn:btih:def456"/>
</entry>
</feed>"#;

    #[test]
    fn parses_rss_enclosure_item() {
        let items = parse_feed("u", SAMPLE_RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Ubuntu 24.04 ISO");
        assert_eq!(items[0].torrent_url.as_deref(), Some("https://example.com/ubuntu.torrent"));
        assert_eq!(items[0].size, Some(4096));
        assert!(items[0].pub_date.is_some());
        assert_eq!(items[0].download_url(), Some("https://example.com/ubuntu.torrent"));
    }

    #[test]
    fn parses_rss_magnet_uri_element() {
        let items = parse_feed("u", SAMPLE_RSS.as_bytes()).unwrap();
        assert_eq!(items[1].magnet.as_deref(), Some("magnet:?xt=urn:btih:abc123"));
        assert_eq!(items[1].download_url(), Some("magnet:?xt=urn:btih:abc123"));
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed("u", SAMPLE_ATOM.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link.as_deref(), Some("https://example.com/debian"));
        assert_eq!(items[0].torrent_url.as_deref(), Some("https://example.com/debian.torrent"));
        assert_eq!(items[1].magnet.as_deref(), Some("magnet:?xt=urn:btih:def456"));
    }

    #[test]
    fn unrecognized_body_yields_empty_list_not_error() {
        let items = parse_feed("u", b"<html><body>not a feed</body></html>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_feed("u", b"<rss><channel><item><title>unterminated").unwrap_err();
        assert!(matches!(err, RssError::Parse { .. }));
    }

    #[test]
    fn download_url_falls_back_to_a_link_ending_dot_torrent() {
        let item = FeedItem { link: Some("https://example.com/linux.torrent".to_string()), ..FeedItem::default() };
        assert_eq!(item.download_url(), Some("https://example.com/linux.torrent"));
    }

    #[test]
    fn download_url_is_none_for_a_plain_page_link() {
        let item = FeedItem { link: Some("https://example.com/page".to_string()), ..FeedItem::default() };
        assert_eq!(item.download_url(), None);
    }

    #[test]
    fn enclosure_type_is_matched_by_substring() {
        let mut item = FeedItem::default();
        let xml = r#"<enclosure url="https://example.com/release" type="application/x-bittorrent; charset=binary"/>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        if let Ok(XmlEvent::Empty(start)) = reader.read_event_into(&mut buf) {
            apply_enclosure(&start, &mut item);
        }
        assert_eq!(item.torrent_url.as_deref(), Some("https://example.com/release"));
    }

    #[test]
    fn rss_link_beginning_with_magnet_is_promoted() {
        let body = r#"<rss><channel><item><title>t</title><link>magnet:?xt=urn:btih:aaa</link></item></channel></rss>"#;
        let items = parse_feed("u", body.as_bytes()).unwrap();
        assert_eq!(items[0].magnet.as_deref(), Some("magnet:?xt=urn:btih:aaa"));
    }

    #[test]
    fn unique_id_prefers_guid_when_present() {
        let item = FeedItem { guid: Some("urn:uuid:1234".to_string()), ..FeedItem::default() };
        assert_eq!(item.unique_id(), "urn:uuid:1234");
    }

    #[test]
    fn unique_id_falls_back_to_a_stable_hash_without_a_guid() {
        let item = FeedItem { title: "Same release".to_string(), ..FeedItem::default() };
        let id_a = item.unique_id();
        let id_b = item.unique_id();
        assert_eq!(id_a, id_b);
        assert_eq!(id_a.len(), 32);
        assert!(id_a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn unique_id_hash_distinguishes_differing_content() {
        let a = FeedItem { title: "Release A".to_string(), ..FeedItem::default() };
        let b = FeedItem { title: "Release B".to_string(), ..FeedItem::default() };
        assert_ne!(a.unique_id(), b.unique_id());
    }
}
