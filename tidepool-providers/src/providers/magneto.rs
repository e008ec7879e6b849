//! Magneto torrent search provider.

use async_trait::async_trait;
use serde::Deserialize;
use tidepool_core::{
    Capabilities, HttpSession, ProviderCache, ProviderContext, ProviderError, ProviderKind,
    RawResult, ResultAccessors, ResultRecord, SearchMode, SearchProvider, SearchStringSet,
    Visibility,
};

use super::{check_status, validate_base_url};

const NAME: &str = "Magneto";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Magneto search provider.
///
/// Talks to a Magneto API instance that aggregates several public indexers
/// behind one JSON search endpoint and a recent-items endpoint.
#[derive(Debug)]
pub struct MagnetoProvider {
    session: HttpSession,
    cache: ProviderCache,
    base_url: String,
    api_key: Option<String>,
}

/// Response from Magneto search and recent endpoints.
#[derive(Debug, Deserialize)]
struct MagnetoResponse {
    results: Vec<MagnetoTorrent>,
}

/// Single torrent result from Magneto.
#[derive(Debug, Deserialize)]
struct MagnetoTorrent {
    name: String,
    magnet: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    seeders: i64,
    #[serde(default)]
    leechers: i64,
}

impl MagnetoProvider {
    /// Creates the provider from `TIDEPOOL_MAGNETO_URL` and
    /// `TIDEPOOL_MAGNETO_API_KEY`, falling back to a local instance.
    ///
    /// # Errors
    /// - `ProviderError::Configuration` - Base URL is invalid or the session cannot be built
    pub fn from_env(context: &ProviderContext) -> Result<Self, ProviderError> {
        let base_url =
            std::env::var("TIDEPOOL_MAGNETO_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("TIDEPOOL_MAGNETO_API_KEY").ok();
        Self::with_config(context, base_url, api_key)
    }

    /// Creates the provider against a specific Magneto instance.
    ///
    /// # Errors
    /// - `ProviderError::Configuration` - Base URL is invalid or the session cannot be built
    pub fn with_config(
        context: &ProviderContext,
        base_url: String,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = validate_base_url(NAME, &base_url)?;
        Ok(Self {
            session: context.session(NAME)?,
            cache: ProviderCache::new(SearchStringSet::single(SearchMode::Rss, [""])),
            base_url,
            api_key,
        })
    }

    fn category(mode: SearchMode) -> &'static str {
        match mode {
            SearchMode::Movie => "movie",
            _ => "tv",
        }
    }

    async fn fetch(&self, mode: SearchMode, query: &str) -> Result<Vec<RawResult>, ProviderError> {
        let mut params = vec![("category", Self::category(mode)), ("limit", "50")];
        if let Some(ref api_key) = self.api_key {
            params.push(("apikey", api_key.as_str()));
        }

        let request = if mode == SearchMode::Rss {
            self.session.get(&format!("{}/api/v1/recent", self.base_url))
        } else {
            params.push(("query", query));
            self.session.get(&format!("{}/api/v1/search", self.base_url))
        };

        let response = request.query(&params).send().await?;
        check_status(NAME, &response)?;

        let parsed: MagnetoResponse = response.json().map_err(|e| ProviderError::Parse {
            provider: NAME.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "{NAME} returned {} results for {mode} '{query}'",
            parsed.results.len()
        );

        Ok(parsed
            .results
            .into_iter()
            .map(|torrent| {
                ResultRecord {
                    hash: tidepool_core::record::info_hash_from_magnet(&torrent.magnet),
                    title: torrent.name,
                    link: torrent.magnet,
                    seeders: torrent.seeders,
                    leechers: torrent.leechers,
                    size: torrent.size.unwrap_or(tidepool_core::UNKNOWN_SIZE),
                }
                .into_raw()
            })
            .collect())
    }
}

impl ResultAccessors for MagnetoProvider {}

#[async_trait]
impl SearchProvider for MagnetoProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            kind: ProviderKind::Torrent,
            visibility: Visibility::Public,
            supports_backlog: true,
            supports_periodic_refresh: true,
        }
    }

    fn session(&self) -> &HttpSession {
        &self.session
    }

    fn cache(&self) -> &ProviderCache {
        &self.cache
    }

    async fn search(&self, strings: &SearchStringSet) -> Result<Vec<RawResult>, ProviderError> {
        let mut results = Vec::new();
        for (mode, queries) in strings.iter() {
            for query in queries {
                results.extend(self.fetch(mode, query).await?);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::extract::Query;
    use axum::routing::get;
    use tidepool_core::{CassetteKey, CassetteKeying, CassetteStore, RecordMode};

    use super::*;

    const HASH: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

    async fn spawn_magneto() -> String {
        let app = Router::new()
            .route(
                "/api/v1/search",
                get(|Query(params): Query<Vec<(String, String)>>| async move {
                    let query = params
                        .iter()
                        .find(|(k, _)| k == "query")
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    axum::Json(serde_json::json!({
                        "total": 1,
                        "results": [{
                            "name": format!("{query} 720p"),
                            "magnet": format!("magnet:?xt=urn:btih:{HASH}&dn=show"),
                            "size": 734_003_200,
                            "seeders": 12,
                            "leechers": 4,
                            "indexer": "local",
                            "category": "tv",
                            "publishDate": "2024-01-01T00:00:00Z"
                        }]
                    }))
                }),
            )
            .route(
                "/api/v1/recent",
                get(|| async { axum::Json(serde_json::json!({ "total": 0, "results": [] })) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_episode_search_normalizes_results() {
        let base = spawn_magneto().await;
        let provider = MagnetoProvider::with_config(&ProviderContext::default(), base, None).unwrap();

        let results = provider
            .search(&SearchStringSet::single(SearchMode::Episode, ["The 100 S07E08"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let record = ResultRecord::from_raw(&results[0]).unwrap();
        assert_eq!(record.title, "The 100 S07E08 720p");
        assert_eq!(record.hash, HASH);
        assert_eq!(record.size, 734_003_200);
        assert_eq!(provider.size(&results[0]), 734_003_200);
    }

    #[tokio::test]
    async fn test_cache_update_uses_recent_feed_through_cassette() {
        let base = spawn_magneto().await;
        let provider = MagnetoProvider::with_config(&ProviderContext::default(), base, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = CassetteStore::new(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider);
        let cassette = Arc::new(store.open(CassetteKey::for_provider(&provider.id())).unwrap());

        let _attached = provider.session().attach_cassette(Arc::clone(&cassette));
        let cached = provider.update_cache().await.unwrap();

        assert_eq!(cached, 0);
        assert!(provider.cache().last_update().is_some());
        let requests = cassette.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("/api/v1/recent?category=tv&limit=50"));
    }

    #[test]
    fn test_invalid_base_url_is_a_configuration_error() {
        let result = MagnetoProvider::with_config(&ProviderContext::default(), "not a url".to_string(), None);
        assert!(matches!(result, Err(ProviderError::Configuration { .. })));
    }
}
