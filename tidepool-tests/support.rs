//! Shared fixtures: the `Alpha` test indexer and cassette helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tidepool_core::{
    Capabilities, Cassette, CassetteKey, CassetteKeying, CassetteStore, HttpSession, ProviderCache,
    ProviderContext, ProviderError, ProviderId, ProviderKind, ProviderRegistry, RawResult,
    RecordMode, RecordedRequest, RecordedResponse, ResultAccessors, SearchMode, SearchProvider,
    SearchStringSet, Visibility,
};
use tidepool_harness::{HarnessContext, Policy};

/// Host the seeded fixtures were recorded against.
pub const ALPHA_BASE: &str = "http://alpha.test";

pub const ALPHA_HASH: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub const PUBLIC_BACKLOG_TORRENT: Capabilities = Capabilities {
    kind: ProviderKind::Torrent,
    visibility: Visibility::Public,
    supports_backlog: true,
    supports_periodic_refresh: true,
};

#[derive(Debug, Deserialize)]
struct AlphaPage {
    results: Vec<RawResult>,
}

/// Minimal JSON indexer: `GET /search?mode=<mode>&q=<query>` returns
/// `{"results": [...]}` with records passed through untouched.
#[derive(Debug)]
pub struct AlphaProvider {
    name: String,
    session: HttpSession,
    cache: ProviderCache,
    base_url: String,
    capabilities: Capabilities,
    searches: AtomicUsize,
}

impl AlphaProvider {
    pub fn new(context: &ProviderContext, base_url: &str) -> Result<Self, ProviderError> {
        Self::named("Alpha", context, base_url, PUBLIC_BACKLOG_TORRENT)
    }

    pub fn named(
        name: &str,
        context: &ProviderContext,
        base_url: &str,
        capabilities: Capabilities,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.to_string(),
            session: context.session(name)?,
            cache: ProviderCache::default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            capabilities,
            searches: AtomicUsize::new(0),
        })
    }

    pub fn with_cache_params(mut self, params: SearchStringSet) -> Self {
        self.cache = ProviderCache::new(params);
        self
    }

    /// Number of times `search` was entered.
    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl ResultAccessors for AlphaProvider {}

#[async_trait]
impl SearchProvider for AlphaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn session(&self) -> &HttpSession {
        &self.session
    }

    fn cache(&self) -> &ProviderCache {
        &self.cache
    }

    async fn search(&self, strings: &SearchStringSet) -> Result<Vec<RawResult>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let mut results = Vec::new();
        for (mode, queries) in strings.iter() {
            for query in queries {
                let response = self
                    .session
                    .get(&format!("{}/search", self.base_url))
                    .query(&[("mode", mode.as_str()), ("q", query.as_str())])
                    .send()
                    .await?;
                if !response.is_success() {
                    return Err(ProviderError::Status {
                        provider: self.name.clone(),
                        status: response.status,
                        url: response.url.clone(),
                    });
                }
                let page: AlphaPage = response.json().map_err(|e| ProviderError::Parse {
                    provider: self.name.clone(),
                    reason: e.to_string(),
                })?;
                results.extend(page.results);
            }
        }
        Ok(results)
    }
}

/// Alpha's episode record: 40-character magnet and hash, 100 MiB.
pub fn alpha_record(size: i64) -> RawResult {
    let value = json!({
        "title": "The.100.S07E08.720p.HDTV.x264-ALPHA",
        "link": format!("magnet:?xt=urn:btih:{ALPHA_HASH}&dn=The.100.S07E08"),
        "hash": ALPHA_HASH,
        "seeders": 3,
        "leechers": 1,
        "size": size,
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!("json! object literal"),
    }
}

/// The canonical `Show S01E01` record: bare 40-character magnet, 100 MiB.
pub fn show_record() -> RawResult {
    let value = json!({
        "title": "Show S01E01",
        "link": format!("magnet:?xt=urn:btih:{ALPHA_HASH}"),
        "hash": ALPHA_HASH,
        "seeders": 3,
        "leechers": 1,
        "size": 104_857_600,
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!("json! object literal"),
    }
}

pub fn alpha_body(records: &[RawResult]) -> String {
    json!({ "results": records }).to_string()
}

/// URL the Alpha provider requests for one query.
pub fn alpha_url(base: &str, mode: SearchMode, query: &str) -> String {
    let mut url = url::Url::parse(&format!("{base}/search")).unwrap();
    url.query_pairs_mut()
        .append_pair("mode", mode.as_str())
        .append_pair("q", query);
    url.to_string()
}

/// Writes a cassette holding `(url, body)` GET interactions, all 200.
pub fn seed_cassette(dir: &Path, key: CassetteKey, interactions: &[(String, String)]) -> PathBuf {
    let store = CassetteStore::new(dir, RecordMode::Extend, CassetteKeying::PerProvider);
    let cassette = Cassette::load(store.path_for(&key), key, RecordMode::Extend).unwrap();
    for (url, body) in interactions {
        cassette
            .record(
                RecordedRequest {
                    method: "GET".to_string(),
                    url: url.clone(),
                    headers: Vec::new(),
                    body: String::new(),
                },
                RecordedResponse {
                    status: 200,
                    headers: vec![("content-type".to_string(), "application/json".to_string())],
                    body: body.clone(),
                },
            )
            .unwrap();
    }
    assert!(cassette.flush().unwrap());
    cassette.path().to_path_buf()
}

/// Seeds Alpha's shared cassette with RSS, episode and season answers.
pub fn seed_alpha(dir: &Path, episode_records: &[RawResult]) -> PathBuf {
    let rss = alpha_body(&[alpha_record(104_857_600)]);
    seed_cassette(
        dir,
        CassetteKey::for_provider(&ProviderId::from_name("Alpha")),
        &[
            (alpha_url(ALPHA_BASE, SearchMode::Rss, ""), rss.clone()),
            (
                alpha_url(ALPHA_BASE, SearchMode::Episode, "The 100 S07E08"),
                alpha_body(episode_records),
            ),
            (alpha_url(ALPHA_BASE, SearchMode::Season, "Game of Thrones S08"), rss),
        ],
    )
}

/// Registry with Alpha pointed at `base`.
pub fn alpha_registry(base: &str) -> ProviderRegistry {
    let base = base.to_string();
    let mut registry = ProviderRegistry::new();
    registry.register("Alpha", move |ctx: &ProviderContext| {
        Ok(Arc::new(AlphaProvider::new(ctx, &base)?) as Arc<dyn SearchProvider>)
    });
    registry
}

pub fn harness(dir: &Path, mode: RecordMode, keying: CassetteKeying, policy: Policy) -> Arc<HarnessContext> {
    Arc::new(HarnessContext::new(CassetteStore::new(dir, mode, keying), policy))
}

pub fn playback_harness(dir: &Path) -> Arc<HarnessContext> {
    harness(dir, RecordMode::Playback, CassetteKeying::PerProvider, Policy::default())
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/cassettes")
}
