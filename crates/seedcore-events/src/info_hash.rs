use std::fmt;

use serde::{Deserialize, Serialize};

/// Torrent identity: a fixed-length hex digest (v1: 20 bytes / 40 hex
/// digits, v2: 32 bytes / 64 hex digits), always canonicalized to lowercase
/// before use as a map key. Construction always goes through [`InfoHash::parse`]
/// so two differently-cased inputs for the same digest compare equal.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum InfoHash {
    /// BitTorrent v1 SHA-1 info-hash (20 bytes).
    V1([u8; 20]),
    /// BitTorrent v2 SHA-256 info-hash (32 bytes).
    V2([u8; 32]),
}

/// Error returned when a string is not a valid 40- or 64-digit hex info-hash.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid info_hash '{value}': {reason}")]
pub struct InfoHashParseError {
    value: String,
    reason: &'static str,
}

impl InfoHash {
    /// Parse a hex info-hash, accepting either case and canonicalizing to
    /// lowercase. Only 40- and 64-digit hex strings are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or is not 40 or 64
    /// digits long.
    pub fn parse(value: &str) -> Result<Self, InfoHashParseError> {
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InfoHashParseError {
                value: value.to_string(),
                reason: "contains non-hex characters",
            });
        }
        match value.len() {
            40 => {
                let mut bytes = [0_u8; 20];
                decode_hex(value, &mut bytes).map_err(|reason| InfoHashParseError {
                    value: value.to_string(),
                    reason,
                })?;
                Ok(Self::V1(bytes))
            }
            64 => {
                let mut bytes = [0_u8; 32];
                decode_hex(value, &mut bytes).map_err(|reason| InfoHashParseError {
                    value: value.to_string(),
                    reason,
                })?;
                Ok(Self::V2(bytes))
            }
            _ => Err(InfoHashParseError {
                value: value.to_string(),
                reason: "must be 40 (v1) or 64 (v2) hex digits",
            }),
        }
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V1(bytes) => bytes.as_slice(),
            Self::V2(bytes) => bytes.as_slice(),
        }
    }
}

fn decode_hex(value: &str, out: &mut [u8]) -> Result<(), &'static str> {
    for (idx, chunk) in out.iter_mut().enumerate() {
        let hi = value.as_bytes()[idx * 2];
        let lo = value.as_bytes()[idx * 2 + 1];
        let hi = (hi as char).to_digit(16).ok_or("invalid hex digit")?;
        let lo = (lo as char).to_digit(16).ok_or("invalid hex digit")?;
        *chunk = u8::try_from(hi * 16 + lo).map_err(|_| "invalid hex digit")?;
    }
    Ok(())
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

impl TryFrom<String> for InfoHash {
    type Error = InfoHashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InfoHash> for String {
    fn from(value: InfoHash) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v1_and_v2_lengths() {
        let v1 = "a".repeat(40);
        let v2 = "b".repeat(64);
        assert!(matches!(InfoHash::parse(&v1), Ok(InfoHash::V1(_))));
        assert!(matches!(InfoHash::parse(&v2), Ok(InfoHash::V2(_))));
    }

    #[test]
    fn canonicalizes_case() {
        let lower = InfoHash::parse(&"ab".repeat(20)).unwrap();
        let upper = InfoHash::parse(&"AB".repeat(20)).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "ab".repeat(20));
    }

    #[test]
    fn rejects_bad_length_and_non_hex() {
        assert!(InfoHash::parse("short").is_err());
        assert!(InfoHash::parse(&"zz".repeat(20)).is_err());
    }
}
