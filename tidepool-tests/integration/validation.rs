//! Result contract checks against records shaped like real provider output.

use serde_json::json;
use tidepool_core::{ProviderContext, RawResult, ResultRecord};
use tidepool_harness::{Violation, is_absolute_url, is_magnet, validate, validate_with_accessors};
use tidepool_providers::DemoFeedProvider;

use crate::support::{ALPHA_HASH, alpha_record};

#[test]
fn test_alpha_record_is_valid() {
    assert!(validate(&alpha_record(104_857_600)).is_empty());
    assert!(validate(&alpha_record(-1)).is_empty());
}

#[test]
fn test_each_contract_break_is_reported() {
    let cases: Vec<(&str, Box<dyn Fn(&mut RawResult)>)> = vec![
        ("hash", Box::new(|r: &mut RawResult| {
            r.remove("hash");
        })),
        ("seeders", Box::new(|r: &mut RawResult| {
            r.insert("seeders".to_string(), json!(-1));
        })),
        ("hash", Box::new(|r: &mut RawResult| {
            r.insert("hash".to_string(), json!("ABCDEFABCD"));
        })),
        ("size", Box::new(|r: &mut RawResult| {
            r.insert("size".to_string(), json!(-5));
        })),
        ("link", Box::new(|r: &mut RawResult| {
            r.insert("link".to_string(), json!("magnet:?xt=urn:btih:ABCDEFABCD"));
        })),
    ];

    for (field, mutate) in cases {
        let mut record = alpha_record(104_857_600);
        mutate(&mut record);
        let violations = validate(&record);
        assert!(
            violations.iter().any(|v| v.field() == Some(field)),
            "expected a '{field}' violation, got {violations:?}"
        );
    }
}

#[test]
fn test_magnet_classification() {
    assert!(is_magnet(&format!("magnet:?xt=urn:btih:{ALPHA_HASH}")));
    assert!(!is_magnet("magnet:?xt=urn:btih:0123456789"));
    assert!(!is_absolute_url("magnet:?xt=urn:btih:0123456789"));

    // A short-hash magnet is a magnet failure, never a URL failure.
    let mut record = alpha_record(1);
    record.insert("link".to_string(), json!("magnet:?xt=urn:btih:0123456789"));
    let violations = validate(&record);
    assert!(matches!(violations.as_slice(), [Violation::InvalidMagnet(_)]));

    record.insert("link".to_string(), json!("https://alpha.test/download/1.torrent"));
    assert!(validate(&record).is_empty());
}

#[tokio::test]
async fn test_demo_feed_output_honors_contract() {
    use tidepool_core::{SearchMode, SearchProvider, SearchStringSet};

    let provider = DemoFeedProvider::new(&ProviderContext::default()).unwrap();
    let results = provider
        .search(&SearchStringSet::single(SearchMode::Episode, ["The 100 S07E08"]))
        .await
        .unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(validate_with_accessors(&provider, result), Vec::<Violation>::new());
        assert!(ResultRecord::from_raw(result).is_some());
    }
}
