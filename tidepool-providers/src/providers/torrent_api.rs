//! Token-authenticated torrent API provider.
//!
//! The API hands out a short-lived token that must accompany every search.
//! The token is fetched lazily and kept until the provider is reset, so
//! every recorded operation starts with exactly one token request.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tidepool_core::{
    Capabilities, HttpSession, ProviderCache, ProviderContext, ProviderError, ProviderKind,
    RawResult, ResultAccessors, ResultRecord, SearchMode, SearchProvider, SearchStringSet,
    UNKNOWN_SIZE, Visibility,
};

use super::{check_status, validate_base_url};

const NAME: &str = "TorrentApi";
const DEFAULT_BASE_URL: &str = "https://torrentapi.org";
const APP_ID: &str = "tidepool";
/// Error code the API uses for an empty result set.
const NO_RESULTS: u32 = 20;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    torrent_results: Vec<ListingEntry>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    title: String,
    download: String,
    #[serde(default)]
    seeders: i64,
    #[serde(default)]
    leechers: i64,
    #[serde(default)]
    size: Option<i64>,
}

/// Provider for the token-based JSON torrent API.
#[derive(Debug)]
pub struct TorrentApiProvider {
    session: HttpSession,
    cache: ProviderCache,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl TorrentApiProvider {
    /// Creates the provider from `TIDEPOOL_TORRENT_API_URL`.
    ///
    /// # Errors
    /// - `ProviderError::Configuration` - Base URL is invalid or the session cannot be built
    pub fn from_env(context: &ProviderContext) -> Result<Self, ProviderError> {
        let base_url = std::env::var("TIDEPOOL_TORRENT_API_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(context, base_url)
    }

    /// Creates the provider against a specific API host.
    ///
    /// # Errors
    /// - `ProviderError::Configuration` - Base URL is invalid or the session cannot be built
    pub fn with_base_url(context: &ProviderContext, base_url: String) -> Result<Self, ProviderError> {
        Ok(Self {
            session: context.session(NAME)?,
            cache: ProviderCache::new(SearchStringSet::single(SearchMode::Rss, [""])),
            base_url: validate_base_url(NAME, &base_url)?,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/pubapi_v2.php", self.base_url)
    }

    async fn token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.lock().clone() {
            return Ok(token);
        }

        let response = self
            .session
            .get(&self.endpoint())
            .query(&[("get_token", "get_token"), ("app_id", APP_ID)])
            .send()
            .await?;
        check_status(NAME, &response)?;

        let TokenResponse { token } = response.json().map_err(|e| ProviderError::Parse {
            provider: NAME.to_string(),
            reason: e.to_string(),
        })?;

        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    async fn fetch(&self, mode: SearchMode, query: &str) -> Result<Vec<RawResult>, ProviderError> {
        let token = self.token().await?;

        let mut params = vec![
            ("category", if mode == SearchMode::Movie { "movies" } else { "tv" }),
            ("format", "json_extended"),
            ("ranked", "0"),
            ("limit", "100"),
            ("token", token.as_str()),
            ("app_id", APP_ID),
        ];
        if mode == SearchMode::Rss {
            params.insert(0, ("mode", "list"));
        } else {
            params.insert(0, ("mode", "search"));
            params.insert(1, ("search_string", query));
        }

        let response = self.session.get(&self.endpoint()).query(&params).send().await?;
        check_status(NAME, &response)?;

        let listing: ListingResponse = response.json().map_err(|e| ProviderError::Parse {
            provider: NAME.to_string(),
            reason: e.to_string(),
        })?;

        match (listing.error_code, listing.error) {
            (Some(NO_RESULTS), _) => {
                tracing::debug!("{NAME} has no results for {mode} '{query}'");
                return Ok(Vec::new());
            }
            (Some(code), reason) => {
                return Err(ProviderError::Unavailable {
                    provider: NAME.to_string(),
                    reason: format!("error {code}: {}", reason.unwrap_or_default()),
                });
            }
            (None, _) => {}
        }

        Ok(listing
            .torrent_results
            .into_iter()
            .map(|entry| {
                ResultRecord {
                    hash: tidepool_core::record::info_hash_from_magnet(&entry.download),
                    title: entry.title,
                    link: entry.download,
                    seeders: entry.seeders,
                    leechers: entry.leechers,
                    size: entry.size.unwrap_or(UNKNOWN_SIZE),
                }
                .into_raw()
            })
            .collect())
    }
}

impl ResultAccessors for TorrentApiProvider {}

#[async_trait]
impl SearchProvider for TorrentApiProvider {
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

    fn reset(&self) {
        self.token.lock().take();
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::Query;
    use axum::routing::get;

    use super::*;

    async fn spawn_api(token_requests: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/pubapi_v2.php",
            get(move |Query(params): Query<Vec<(String, String)>>| {
                let token_requests = Arc::clone(&token_requests);
                async move {
                    let get = |key: &str| {
                        params
                            .iter()
                            .find(|(k, _)| k == key)
                            .map(|(_, v)| v.clone())
                    };
                    if get("get_token").is_some() {
                        token_requests.fetch_add(1, Ordering::SeqCst);
                        return axum::Json(serde_json::json!({ "token": "t0k3n" }));
                    }
                    match get("search_string").as_deref() {
                        Some("Nothing Here S01E01") => axum::Json(serde_json::json!({
                            "error": "No results found",
                            "error_code": 20
                        })),
                        Some("Broken") => axum::Json(serde_json::json!({
                            "error": "Invalid token",
                            "error_code": 4
                        })),
                        _ => axum::Json(serde_json::json!({
                            "torrent_results": [{
                                "title": "The.100.S07E08.720p.HDTV.x264",
                                "download": "magnet:?xt=urn:btih:abcdefabcdefabcdefabcdefabcdefabcdefabcd&dn=The.100",
                                "seeders": 30,
                                "leechers": 2,
                                "size": 512_000_000
                            }]
                        })),
                    }
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
    async fn test_token_fetched_once_per_provider() {
        let token_requests = Arc::new(AtomicUsize::new(0));
        let base = spawn_api(Arc::clone(&token_requests)).await;
        let provider = TorrentApiProvider::with_base_url(&ProviderContext::default(), base).unwrap();

        let episode = SearchStringSet::single(SearchMode::Episode, ["The 100 S07E08"]);
        let first = provider.search(&episode).await.unwrap();
        let second = provider.search(&episode).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(token_requests.load(Ordering::SeqCst), 1);

        let record = ResultRecord::from_raw(&first[0]).unwrap();
        assert_eq!(record.hash, "ABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD");
    }

    #[tokio::test]
    async fn test_reset_forces_a_fresh_token() {
        let token_requests = Arc::new(AtomicUsize::new(0));
        let base = spawn_api(Arc::clone(&token_requests)).await;
        let provider = TorrentApiProvider::with_base_url(&ProviderContext::default(), base).unwrap();

        let episode = SearchStringSet::single(SearchMode::Episode, ["The 100 S07E08"]);
        provider.search(&episode).await.unwrap();
        provider.reset();
        provider.search(&episode).await.unwrap();

        assert_eq!(token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_results_code_is_an_empty_set() {
        let base = spawn_api(Arc::new(AtomicUsize::new(0))).await;
        let provider = TorrentApiProvider::with_base_url(&ProviderContext::default(), base).unwrap();

        let results = provider
            .search(&SearchStringSet::single(SearchMode::Episode, ["Nothing Here S01E01"]))
            .await
            .unwrap();
        assert!(results.is_empty());

        let error = provider
            .search(&SearchStringSet::single(SearchMode::Episode, ["Broken"]))
            .await
            .unwrap_err();
        assert!(matches!(error, ProviderError::Unavailable { .. }));
    }
}
