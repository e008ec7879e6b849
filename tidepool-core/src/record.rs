//! Normalized search result records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result as emitted by a provider search: a loosely typed JSON object.
///
/// Kept untyped so the validator can detect missing, extra and mistyped
/// fields instead of losing them during deserialization.
pub type RawResult = Map<String, Value>;

/// Field names of the canonical result record, sorted.
pub const RESULT_FIELDS: [&str; 6] = ["hash", "leechers", "link", "seeders", "size", "title"];

/// Size value meaning "unknown size".
pub const UNKNOWN_SIZE: i64 = -1;

/// Typed form of the canonical result record.
///
/// Providers build these and serialize them with [`ResultRecord::into_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub title: String,
    pub link: String,
    pub hash: String,
    pub seeders: i64,
    pub leechers: i64,
    pub size: i64,
}

impl ResultRecord {
    /// Converts the record into the raw JSON object shape.
    pub fn into_raw(self) -> RawResult {
        let mut raw = Map::new();
        raw.insert("title".to_string(), Value::String(self.title));
        raw.insert("link".to_string(), Value::String(self.link));
        raw.insert("hash".to_string(), Value::String(self.hash));
        raw.insert("seeders".to_string(), Value::from(self.seeders));
        raw.insert("leechers".to_string(), Value::from(self.leechers));
        raw.insert("size".to_string(), Value::from(self.size));
        raw
    }

    /// Parses a raw result back into the typed form.
    ///
    /// Returns `None` when any field is missing or has the wrong type.
    pub fn from_raw(raw: &RawResult) -> Option<Self> {
        serde_json::from_value(Value::Object(raw.clone())).ok()
    }
}

/// Extracts the info hash from a `magnet:` link, upper-cased.
///
/// Returns an empty string when the link carries no `btih` topic.
pub fn info_hash_from_magnet(link: &str) -> String {
    link.split(['?', '&'])
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .map(str::to_uppercase)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultRecord {
        ResultRecord {
            title: "Show S01E01".to_string(),
            link: "magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            hash: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            seeders: 3,
            leechers: 1,
            size: 104_857_600,
        }
    }

    #[test]
    fn test_into_raw_has_exactly_the_canonical_fields() {
        let raw = sample().into_raw();
        let mut keys: Vec<&str> = raw.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, RESULT_FIELDS);
    }

    #[test]
    fn test_from_raw_rejects_mistyped_fields() {
        let mut raw = sample().into_raw();
        assert_eq!(ResultRecord::from_raw(&raw), Some(sample()));

        raw.insert("seeders".to_string(), Value::String("3".to_string()));
        assert_eq!(ResultRecord::from_raw(&raw), None);
    }

    #[test]
    fn test_info_hash_from_magnet() {
        assert_eq!(
            info_hash_from_magnet("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01&dn=x"),
            "ABCDEF0123456789ABCDEF0123456789ABCDEF01"
        );
        assert_eq!(info_hash_from_magnet("https://example.com/file.torrent"), "");
    }
}
