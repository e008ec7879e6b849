//! Extend-mode runs against a live local indexer, then offline replay.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::Query;
use axum::routing::get;
use tidepool_core::{CassetteKeying, ProviderContext, ProviderRegistry, RecordMode, SearchProvider};
use tidepool_harness::{ConformanceRunner, Operation, Policy, Selection, synthesize};
use tidepool_providers::TorrentApiProvider;

use crate::support::{alpha_body, alpha_record, alpha_registry, harness};

async fn spawn_indexer(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/search",
        get(move |Query(_params): Query<Vec<(String, String)>>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                alpha_body(&[alpha_record(104_857_600)])
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_extend_records_then_playback_replays_offline() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_indexer(Arc::clone(&hits)).await;
    let dir = tempfile::tempdir().unwrap();
    let selection = Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]);

    let enumeration = alpha_registry(&base).list_providers(&ProviderContext::default());
    let recording = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider, Policy::default()),
    );
    let recorded = ConformanceRunner::new().run(&recording, &selection).await;

    assert!(!recorded.has_failures(), "{recorded}");
    assert!(dir.path().join("alpha.yaml").exists());
    // The second operation replays the interaction the first one recorded.
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let replaying = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider, Policy::default()),
    );
    let replayed = ConformanceRunner::new().run(&replaying, &selection).await;

    assert!(!replayed.has_failures(), "{replayed}");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_per_operation_keying_writes_one_cassette_per_operation() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_indexer(Arc::clone(&hits)).await;
    let dir = tempfile::tempdir().unwrap();

    let enumeration = alpha_registry(&base).list_providers(&ProviderContext::default());
    let suites = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Extend, CassetteKeying::PerOperation, Policy::default()),
    );
    let report = ConformanceRunner::new()
        .run(
            &suites,
            &Selection::all().with_operations([Operation::EpisodeSearch, Operation::ResultValues]),
        )
        .await;

    assert!(!report.has_failures(), "{report}");
    assert!(dir.path().join("alpha.episode_search.yaml").exists());
    assert!(dir.path().join("alpha.result_values.yaml").exists());
    assert!(!dir.path().join("alpha.yaml").exists());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_playback_without_recording_is_an_interaction_mismatch() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_indexer(Arc::clone(&hits)).await;
    let dir = tempfile::tempdir().unwrap();

    let enumeration = alpha_registry(&base).list_providers(&ProviderContext::default());
    let suites = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider, Policy::default()),
    );
    let report = ConformanceRunner::new()
        .run(&suites, &Selection::all().with_operations([Operation::SeasonSearch]))
        .await;

    let season = report.find("Alpha", Operation::SeasonSearch).unwrap();
    assert!(matches!(
        season.outcome.error(),
        Some(tidepool_harness::ConformanceError::InteractionMismatch(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("alpha.yaml").exists());
}

/// Token-gated API: `get_token` hands out a token, anything else one listing.
async fn spawn_torrent_api(token_requests: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/pubapi_v2.php",
        get(move |Query(params): Query<Vec<(String, String)>>| {
            let token_requests = Arc::clone(&token_requests);
            async move {
                if params.iter().any(|(key, _)| key == "get_token") {
                    token_requests.fetch_add(1, Ordering::SeqCst);
                    return axum::Json(serde_json::json!({ "token": "t0k3n" }));
                }
                axum::Json(serde_json::json!({
                    "torrent_results": [{
                        "title": "The.100.S07E08.720p.HDTV.x264",
                        "download": "magnet:?xt=urn:btih:abcdefabcdefabcdefabcdefabcdefabcdefabcd",
                        "seeders": 30,
                        "leechers": 2,
                        "size": 512_000_000
                    }]
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn torrent_api_registry(base: &str) -> ProviderRegistry {
    let base = base.to_string();
    let mut registry = ProviderRegistry::new();
    registry.register("TorrentApi", move |ctx: &ProviderContext| {
        Ok(Arc::new(TorrentApiProvider::with_base_url(ctx, base.clone())?) as Arc<dyn SearchProvider>)
    });
    registry
}

#[tokio::test]
async fn test_per_operation_cassettes_replay_on_their_own() {
    let token_requests = Arc::new(AtomicUsize::new(0));
    let base = spawn_torrent_api(Arc::clone(&token_requests)).await;
    let dir = tempfile::tempdir().unwrap();

    let enumeration = torrent_api_registry(&base).list_providers(&ProviderContext::default());
    let recording = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Extend, CassetteKeying::PerOperation, Policy::default()),
    );
    let recorded = ConformanceRunner::new()
        .run(
            &recording,
            &Selection::all().with_operations([Operation::RssSearch, Operation::EpisodeSearch]),
        )
        .await;

    assert!(!recorded.has_failures(), "{recorded}");
    // Each operation fetched its own token into its own cassette.
    assert_eq!(token_requests.load(Ordering::SeqCst), 2);

    // A fresh provider replays the second operation without the first.
    let enumeration = torrent_api_registry(&base).list_providers(&ProviderContext::default());
    let replaying = synthesize(
        &enumeration,
        harness(dir.path(), RecordMode::Playback, CassetteKeying::PerOperation, Policy::default()),
    );
    let replayed = ConformanceRunner::new()
        .run(&replaying, &Selection::all().with_operations([Operation::EpisodeSearch]))
        .await;

    assert!(!replayed.has_failures(), "{replayed}");
    let episode = replayed.find("TorrentApi", Operation::EpisodeSearch).unwrap();
    assert_eq!(episode.requests, 2);
    assert_eq!(token_requests.load(Ordering::SeqCst), 2);
}
