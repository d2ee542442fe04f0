use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// An inclusive IPv4 address range, as found in an IP blocklist file or
/// configured directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    /// Human-readable label for the range, if the line supplied one.
    pub description: String,
    /// First address in the range (inclusive).
    pub start: Ipv4Addr,
    /// Last address in the range (inclusive).
    pub end: Ipv4Addr,
}

impl IpRange {
    /// Whether `ip` falls within `[start, end]`.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let start: u32 = self.start.into();
        let end: u32 = self.end.into();
        let value: u32 = ip.into();
        (start..=end).contains(&value)
    }
}

/// Parse an IP blocklist file's contents into a list of ranges.
///
/// Blank lines and lines beginning `#` are ignored. Accepted line shapes are
/// `NAME:START_IP-END_IP` and `START_IP-END_IP`. Malformed lines are skipped
/// with a warning rather than aborting the whole file.
#[must_use]
pub fn parse_blocklist(text: &str) -> Vec<IpRange> {
    let mut ranges = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(range) => ranges.push(range),
            None => warn!(line = line_no + 1, content = line, "skipping malformed blocklist line"),
        }
    }
    ranges
}

fn parse_line(line: &str) -> Option<IpRange> {
    let (description, span) = match line.split_once(':') {
        Some((name, rest)) => (name.to_string(), rest),
        None => (String::new(), line),
    };
    let (start_str, end_str) = span.split_once('-')?;
    let start = start_str.trim().parse().ok()?;
    let end = end_str.trim().parse().ok()?;
    Some(IpRange { description, start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_bare_ranges() {
        let text = "# comment\n\nBad actors:1.2.3.0-1.2.3.255\n10.0.0.1-10.0.0.10\n";
        let ranges = parse_blocklist(text);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].description, "Bad actors");
        assert_eq!(ranges[1].description, "");
    }

    #[test]
    fn skips_malformed_lines() {
        let text = "garbage line\n1.2.3.4\n1.2.3.0-1.2.3.10\n";
        let ranges = parse_blocklist(text);
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn contains_is_inclusive() {
        let range = IpRange {
            description: String::new(),
            start: Ipv4Addr::new(10, 0, 0, 1),
            end: Ipv4Addr::new(10, 0, 0, 5),
        };
        assert!(range.contains(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(range.contains(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(!range.contains(Ipv4Addr::new(10, 0, 0, 6)));
    }
}
