//! Skipped operations never touch cassettes or providers.

use std::sync::Arc;

use tidepool_core::{CassetteKeying, ProviderContext, ProviderId, RecordMode, SearchProvider};
use tidepool_harness::{ConformanceSuite, Operation, Outcome, Policy, SkipPolicy, skip_reason};

use crate::support::{ALPHA_BASE, AlphaProvider, harness};

fn skipping_rss() -> Policy {
    let mut skip = SkipPolicy::new();
    skip.disable(ProviderId::from_name("Alpha"), Operation::RssSearch);
    Policy {
        skip,
        ..Policy::default()
    }
}

#[tokio::test]
async fn test_skip_short_circuits_before_cassette_and_search() {
    let dir = tempfile::tempdir().unwrap();
    // Unparseable cassette: opening it would fail the operation.
    std::fs::write(dir.path().join("alpha.yaml"), "interactions: [[[").unwrap();

    let provider = Arc::new(AlphaProvider::new(&ProviderContext::default(), ALPHA_BASE).unwrap());
    let suite = ConformanceSuite::new(
        Arc::clone(&provider) as Arc<dyn SearchProvider>,
        harness(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider, skipping_rss()),
    );

    let report = suite.run(Operation::RssSearch).await;

    match &report.outcome {
        Outcome::Skipped(reason) => {
            assert_eq!(reason, "Test is programmatically disabled for provider Alpha");
            assert_eq!(reason, &skip_reason("Alpha"));
        }
        other => panic!("expected skip, got {other:?}"),
    }
    assert_eq!(report.requests, 0);
    assert_eq!(provider.search_calls(), 0);
    assert!(provider.session().cassette().is_none());
    assert!(provider.session().verifies_certificates());
}

#[tokio::test]
async fn test_skip_applies_to_named_operation_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.yaml"), "interactions: [[[").unwrap();

    let provider = Arc::new(AlphaProvider::new(&ProviderContext::default(), ALPHA_BASE).unwrap());
    let suite = ConformanceSuite::new(
        Arc::clone(&provider) as Arc<dyn SearchProvider>,
        harness(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider, skipping_rss()),
    );

    let report = suite.run(Operation::EpisodeSearch).await;
    assert!(report.outcome.is_failed());
    assert_eq!(provider.search_calls(), 0, "corrupt cassette fails before the provider runs");
}
