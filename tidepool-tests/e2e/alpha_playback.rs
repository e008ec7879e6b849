//! Alpha indexer replayed from seeded cassettes.

use tidepool_core::ProviderContext;
use tidepool_harness::{
    ConformanceError, ConformanceRunner, Operation, Outcome, Selection, Violation, synthesize,
};

use crate::support::{
    ALPHA_BASE, alpha_record, alpha_registry, fixtures_dir, playback_harness, seed_alpha,
    show_record,
};

#[tokio::test]
async fn test_full_run_against_recorded_fixture_passes() {
    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(&fixtures_dir()));
    let report = ConformanceRunner::new().run(&suites, &Selection::all()).await;

    assert!(!report.has_failures(), "{report}");
    assert_eq!(report.summary().passed, Operation::ALL.len());

    let episode = report.find("Alpha", Operation::EpisodeSearch).unwrap();
    assert_eq!(episode.requests, 1);
    assert_eq!(episode.description, "Check that Alpha parses episode search results");
}

#[tokio::test]
async fn test_episode_record_with_valid_magnet_passes() {
    let dir = tempfile::tempdir().unwrap();
    seed_alpha(dir.path(), &[alpha_record(104_857_600)]);

    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let report = ConformanceRunner::new()
        .run(
            &suites,
            &Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]),
        )
        .await;

    assert!(report.find("Alpha", Operation::EpisodeSearch).unwrap().outcome.is_passed());
    assert!(report.find("Alpha", Operation::ResultValues).unwrap().outcome.is_passed());
}

#[tokio::test]
async fn test_show_record_passes_with_zero_violations() {
    let dir = tempfile::tempdir().unwrap();
    seed_alpha(dir.path(), &[show_record()]);

    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let report = ConformanceRunner::new()
        .run(
            &suites,
            &Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]),
        )
        .await;

    assert!(!report.has_failures(), "{report}");
    let episode = report.find("Alpha", Operation::EpisodeSearch).unwrap();
    assert_eq!(episode.requests, 1);
    assert!(report.find("Alpha", Operation::ResultValues).unwrap().outcome.is_passed());
}

#[tokio::test]
async fn test_negative_size_fails_result_values_on_size() {
    let dir = tempfile::tempdir().unwrap();
    seed_alpha(dir.path(), &[alpha_record(-5)]);

    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let report = ConformanceRunner::new()
        .run(
            &suites,
            &Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]),
        )
        .await;

    // Searching still works; only the record contract is broken.
    assert!(report.find("Alpha", Operation::EpisodeSearch).unwrap().outcome.is_passed());

    let result_values = report.find("Alpha", Operation::ResultValues).unwrap();
    match &result_values.outcome {
        Outcome::Failed(ConformanceError::ContractViolation { index, violations, .. }) => {
            assert_eq!(*index, 0);
            assert_eq!(
                violations,
                &vec![Violation::BelowMinimum { field: "size", value: -5, min: -1 }]
            );
        }
        other => panic!("expected a contract violation, got {other:?}"),
    }
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_empty_episode_results_fail_assertion() {
    let dir = tempfile::tempdir().unwrap();
    seed_alpha(dir.path(), &[]);

    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let report = ConformanceRunner::new()
        .run(
            &suites,
            &Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]),
        )
        .await;

    let episode = report.find("Alpha", Operation::EpisodeSearch).unwrap();
    match episode.outcome.error() {
        Some(ConformanceError::Assertion { message }) => {
            assert!(message.contains("returned no Episode results"), "{message}");
        }
        other => panic!("expected an assertion failure, got {other:?}"),
    }
    // No records means nothing to violate.
    assert!(report.find("Alpha", Operation::ResultValues).unwrap().outcome.is_passed());
}
