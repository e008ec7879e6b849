//! Replaying a cassette is idempotent.

use tidepool_core::ProviderContext;
use tidepool_harness::{ConformanceRunner, RunReport, Selection, synthesize};

use crate::support::{ALPHA_BASE, alpha_record, alpha_registry, playback_harness, seed_alpha};

fn fingerprint(report: &RunReport) -> Vec<(String, usize, bool, bool)> {
    report
        .operations
        .iter()
        .map(|op| {
            (
                op.label(),
                op.requests,
                op.outcome.is_passed(),
                op.outcome.is_skipped(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_replaying_twice_gives_identical_reports() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = seed_alpha(dir.path(), &[alpha_record(104_857_600), alpha_record(-5)]);
    let before = std::fs::read_to_string(&cassette).unwrap();

    let enumeration = alpha_registry(ALPHA_BASE).list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let runner = ConformanceRunner::new();

    let first = runner.run(&suites, &Selection::all()).await;
    let second = runner.run(&suites, &Selection::all()).await;

    assert_eq!(fingerprint(&first), fingerprint(&second));
    assert_eq!(first.summary(), second.summary());
    assert_eq!(first.summary().failed, 1, "{first}");

    // Playback never rewrites the cassette.
    assert_eq!(std::fs::read_to_string(&cassette).unwrap(), before);
}
