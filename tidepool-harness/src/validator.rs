//! Contract checks for raw provider results.
//!
//! A valid record has exactly the fields `title`, `link`, `hash`, `seeders`,
//! `leechers` and `size`. Checks run in a fixed order and every violation is
//! reported, so a record may fail several at once.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tidepool_core::{RESULT_FIELDS, RawResult, ResultAccessors, UNKNOWN_SIZE};

static MAGNET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^magnet:\?xt=urn:btih:[A-Za-z0-9]{32,40}(?:&|$)").expect("magnet pattern is valid")
});

/// Accepted info-hash lengths: absent, base32, hex.
const HASH_LENGTHS: [usize; 3] = [0, 32, 40];

/// A single way a record breaks the result contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unexpected field '{0}'")]
    UnexpectedField(String),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field '{0}' is empty")]
    Empty(&'static str),

    #[error("field '{field}' is {value}, below the minimum of {min}")]
    BelowMinimum {
        field: &'static str,
        value: i64,
        min: i64,
    },

    #[error("hash has length {0}, expected 0, 32 or 40")]
    HashLength(usize),

    #[error("link '{0}' is not a valid magnet URI")]
    InvalidMagnet(String),

    #[error("link '{0}' is not an absolute URL")]
    InvalidUrl(String),

    #[error("provider could not extract a title and url")]
    MissingTitleOrUrl,

    #[error("provider reported a zero size")]
    ZeroSize,
}

impl Violation {
    /// Record field the violation concerns, when it concerns one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Violation::MissingField(field)
            | Violation::WrongType { field, .. }
            | Violation::Empty(field)
            | Violation::BelowMinimum { field, .. } => Some(*field),
            Violation::UnexpectedField(field) => Some(field.as_str()),
            Violation::HashLength(_) => Some("hash"),
            Violation::InvalidMagnet(_) | Violation::InvalidUrl(_) => Some("link"),
            Violation::ZeroSize => Some("size"),
            Violation::MissingTitleOrUrl => None,
        }
    }
}

/// Whether `link` is a magnet URI with a 32 to 40 character btih hash.
pub fn is_magnet(link: &str) -> bool {
    MAGNET.is_match(link)
}

/// Whether `link` parses as an absolute URL with a host.
pub fn is_absolute_url(link: &str) -> bool {
    url::Url::parse(link).is_ok_and(|parsed| parsed.has_host())
}

/// Checks one record against the result contract. Empty means valid.
pub fn validate(record: &RawResult) -> Vec<Violation> {
    let mut violations = Vec::new();

    let present: BTreeSet<&str> = record.keys().map(String::as_str).collect();
    for field in RESULT_FIELDS {
        if !present.contains(field) {
            violations.push(Violation::MissingField(field));
        }
    }
    for field in &present {
        if !RESULT_FIELDS.contains(field) {
            violations.push(Violation::UnexpectedField((*field).to_string()));
        }
    }

    let title = string_field(record, "title", &mut violations);
    let link = string_field(record, "link", &mut violations);
    let hash = string_field(record, "hash", &mut violations);
    let seeders = integer_field(record, "seeders", &mut violations);
    let leechers = integer_field(record, "leechers", &mut violations);
    let size = integer_field(record, "size", &mut violations);

    if title.is_some_and(str::is_empty) {
        violations.push(Violation::Empty("title"));
    }
    if link.is_some_and(str::is_empty) {
        violations.push(Violation::Empty("link"));
    }

    for (field, value, min) in [
        ("seeders", seeders, 0),
        ("leechers", leechers, 0),
        ("size", size, UNKNOWN_SIZE),
    ] {
        if let Some(value) = value.filter(|value| *value < min) {
            violations.push(Violation::BelowMinimum { field, value, min });
        }
    }

    if let Some(hash) = hash {
        let length = hash.chars().count();
        if !HASH_LENGTHS.contains(&length) {
            violations.push(Violation::HashLength(length));
        }
    }

    if let Some(link) = link.filter(|link| !link.is_empty()) {
        if link.starts_with("magnet") {
            if !is_magnet(link) {
                violations.push(Violation::InvalidMagnet(link.to_string()));
            }
        } else if !is_absolute_url(link) {
            violations.push(Violation::InvalidUrl(link.to_string()));
        }
    }

    violations
}

/// Runs [`validate`] and additionally requires the provider's own accessors
/// to extract a title/url pair and a non-zero size from the record.
pub fn validate_with_accessors<P>(provider: &P, record: &RawResult) -> Vec<Violation>
where
    P: ResultAccessors + ?Sized,
{
    let mut violations = validate(record);

    if !matches!(provider.title_and_url(record), (Some(_), Some(_))) {
        violations.push(Violation::MissingTitleOrUrl);
    }
    if provider.size(record) == 0 {
        violations.push(Violation::ZeroSize);
    }

    violations
}

fn string_field<'a>(
    record: &'a RawResult,
    field: &'static str,
    violations: &mut Vec<Violation>,
) -> Option<&'a str> {
    let value = record.get(field)?;
    match value.as_str() {
        Some(s) => Some(s),
        None => {
            violations.push(Violation::WrongType {
                field,
                expected: "a string",
            });
            None
        }
    }
}

fn integer_field(
    record: &RawResult,
    field: &'static str,
    violations: &mut Vec<Violation>,
) -> Option<i64> {
    let value = record.get(field)?;
    let integer = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|_| i64::MAX)),
        _ => None,
    };
    if integer.is_none() {
        violations.push(Violation::WrongType {
            field,
            expected: "an integer",
        });
    }
    integer
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use tidepool_core::ResultRecord;

    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn valid_record() -> RawResult {
        ResultRecord {
            title: "The.100.S07E08.720p.HDTV.x264".to_string(),
            link: format!("magnet:?xt=urn:btih:{HASH}&dn=The.100"),
            hash: HASH.to_string(),
            seeders: 10,
            leechers: 2,
            size: 734_003_200,
        }
        .into_raw()
    }

    struct FieldAccessors;
    impl ResultAccessors for FieldAccessors {}

    #[test]
    fn test_exact_record_is_valid() {
        assert!(validate(&valid_record()).is_empty());
        assert!(validate_with_accessors(&FieldAccessors, &valid_record()).is_empty());
    }

    #[test]
    fn test_field_set_must_be_exact() {
        let mut missing = valid_record();
        missing.remove("seeders");
        assert_eq!(validate(&missing), vec![Violation::MissingField("seeders")]);

        let mut extra = valid_record();
        extra.insert("indexer".to_string(), json!("local"));
        assert_eq!(validate(&extra), vec![Violation::UnexpectedField("indexer".to_string())]);
    }

    #[test]
    fn test_types_are_checked() {
        let mut record = valid_record();
        record.insert("seeders".to_string(), json!("10"));
        record.insert("size".to_string(), json!(1.5));
        record.insert("title".to_string(), json!(null));

        let violations = validate(&record);
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().all(|v| matches!(v, Violation::WrongType { .. })));
    }

    #[test]
    fn test_empty_title_and_link_fail() {
        let mut record = valid_record();
        record.insert("title".to_string(), json!(""));
        record.insert("link".to_string(), json!(""));
        assert_eq!(validate(&record), vec![Violation::Empty("title"), Violation::Empty("link")]);
    }

    #[test]
    fn test_bounds_and_hash_length() {
        let mut record = valid_record();
        record.insert("seeders".to_string(), json!(-1));
        record.insert("hash".to_string(), json!("0123456789"));

        let violations = validate(&record);
        assert_eq!(
            violations,
            vec![
                Violation::BelowMinimum { field: "seeders", value: -1, min: 0 },
                Violation::HashLength(10),
            ]
        );

        let mut unknown_size = valid_record();
        unknown_size.insert("size".to_string(), json!(-1));
        unknown_size.insert("hash".to_string(), json!(""));
        assert!(validate(&unknown_size).is_empty());
    }

    #[test]
    fn test_magnet_links_never_fall_back_to_url_validation() {
        assert!(is_magnet(&format!("magnet:?xt=urn:btih:{HASH}")));
        assert!(is_magnet("magnet:?xt=urn:btih:ABCDEFGHIJKLMNOPQRSTUVWXYZ234567&tr=udp://x"));
        assert!(!is_magnet("magnet:?xt=urn:btih:0123456789"));
        assert!(!is_magnet(&format!("magnet:?xt=urn:btih:{HASH}ff")));

        let mut record = valid_record();
        record.insert("link".to_string(), json!("magnet:?xt=urn:btih:0123456789"));
        assert_eq!(
            validate(&record),
            vec![Violation::InvalidMagnet("magnet:?xt=urn:btih:0123456789".to_string())]
        );
    }

    #[test]
    fn test_non_magnet_links_must_be_absolute_urls() {
        let mut record = valid_record();
        record.insert("link".to_string(), json!("https://example.com/download/1.torrent"));
        assert!(validate(&record).is_empty());

        record.insert("link".to_string(), json!("/download/1.torrent"));
        assert_eq!(validate(&record)[0].field(), Some("link"));

        assert!(!is_absolute_url("mailto:someone@example.com"));
    }

    #[test]
    fn test_accessor_checks() {
        let mut record = valid_record();
        record.insert("size".to_string(), json!(0));
        assert_eq!(validate_with_accessors(&FieldAccessors, &record), vec![Violation::ZeroSize]);

        record.insert("title".to_string(), json!("   "));
        let violations = validate_with_accessors(&FieldAccessors, &record);
        assert!(violations.contains(&Violation::MissingTitleOrUrl));
    }

    proptest! {
        #[test]
        fn prop_non_negative_counts_pass(seeders in 0i64..i64::MAX, leechers in 0i64..i64::MAX, size in -1i64..i64::MAX) {
            let mut record = valid_record();
            record.insert("seeders".to_string(), json!(seeders));
            record.insert("leechers".to_string(), json!(leechers));
            record.insert("size".to_string(), json!(size));
            prop_assert!(validate(&record).is_empty());
        }

        #[test]
        fn prop_size_below_unknown_fails(size in i64::MIN..-1i64) {
            let mut record = valid_record();
            record.insert("size".to_string(), json!(size));
            let violations = validate(&record);
            prop_assert_eq!(violations.len(), 1);
            prop_assert_eq!(violations[0].field(), Some("size"));
        }

        #[test]
        fn prop_hash_length_outside_set_fails(length in 1usize..64) {
            prop_assume!(!HASH_LENGTHS.contains(&length));
            let mut record = valid_record();
            record.insert("hash".to_string(), json!("a".repeat(length)));
            prop_assert_eq!(validate(&record), vec![Violation::HashLength(length)]);
        }
    }
}
