//! Suite synthesis from the provider registry.

use std::sync::Arc;

use tidepool_core::{
    Capabilities, ProviderContext, ProviderError, ProviderKind, SearchProvider, Visibility,
};
use tidepool_harness::{ConformanceError, ConformanceRunner, Operation, Selection, synthesize};
use tidepool_providers::builtin_registry;

use crate::support::{
    ALPHA_BASE, AlphaProvider, PUBLIC_BACKLOG_TORRENT, alpha_record, alpha_registry,
    playback_harness, seed_alpha,
};

fn register_variant(
    registry: &mut tidepool_core::ProviderRegistry,
    name: &'static str,
    capabilities: Capabilities,
) {
    registry.register(name, move |ctx: &ProviderContext| {
        Ok(Arc::new(AlphaProvider::named(name, ctx, ALPHA_BASE, capabilities)?) as Arc<dyn SearchProvider>)
    });
}

#[test]
fn test_exactly_one_suite_per_qualifying_provider() {
    let mut registry = alpha_registry(ALPHA_BASE);
    register_variant(
        &mut registry,
        "Usenet",
        Capabilities { kind: ProviderKind::Nzb, ..PUBLIC_BACKLOG_TORRENT },
    );
    register_variant(
        &mut registry,
        "Members Only",
        Capabilities { visibility: Visibility::Private, ..PUBLIC_BACKLOG_TORRENT },
    );
    register_variant(
        &mut registry,
        "Feed Only",
        Capabilities { supports_backlog: false, ..PUBLIC_BACKLOG_TORRENT },
    );
    register_variant(
        &mut registry,
        "Quiet",
        Capabilities { supports_periodic_refresh: false, ..PUBLIC_BACKLOG_TORRENT },
    );

    let dir = tempfile::tempdir().unwrap();
    let enumeration = registry.list_providers(&ProviderContext::default());
    assert_eq!(enumeration.providers.len(), 5);

    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let names: Vec<&str> = suites.iter().map(|suite| suite.name()).collect();
    assert_eq!(names, vec!["Alpha", "Quiet"]);
}

#[test]
fn test_builtin_registry_yields_suites_for_backlog_providers() {
    let dir = tempfile::tempdir().unwrap();
    let enumeration = builtin_registry().list_providers(&ProviderContext::default());
    let suites = synthesize(&enumeration, playback_harness(dir.path()));

    let names: Vec<&str> = suites.iter().map(|suite| suite.name()).collect();
    assert_eq!(names, vec!["Magneto", "TorrentApi"]);
}

#[tokio::test]
async fn test_failing_factory_is_isolated_from_other_suites() {
    let dir = tempfile::tempdir().unwrap();
    seed_alpha(dir.path(), &[alpha_record(104_857_600)]);

    let mut registry = alpha_registry(ALPHA_BASE);
    registry.register("Broken", |_ctx: &ProviderContext| {
        Err::<Arc<dyn SearchProvider>, _>(ProviderError::Configuration {
            provider: "Broken".to_string(),
            reason: "missing base url".to_string(),
        })
    });

    let enumeration = registry.list_providers(&ProviderContext::default());
    assert_eq!(enumeration.setup_errors.len(), 1);

    let suites = synthesize(&enumeration, playback_harness(dir.path()));
    let report = ConformanceRunner::new()
        .with_setup_errors(&enumeration.setup_errors)
        .run(&suites, &Selection::all().with_operations([Operation::EpisodeSearch]))
        .await;

    assert!(report.find("Alpha", Operation::EpisodeSearch).unwrap().outcome.is_passed());
    assert!(matches!(
        &report.setup_errors[0],
        ConformanceError::Setup { provider, .. } if provider == "Broken"
    ));
    assert!(report.has_failures());
}
