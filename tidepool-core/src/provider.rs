//! Provider capability interface consumed by the conformance harness.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::http::{HttpError, HttpSession};
use crate::record::{RawResult, UNKNOWN_SIZE};
use crate::search::{SearchMode, SearchStringSet};

/// Errors raised by providers while constructing, searching or refreshing.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("{provider} returned HTTP {status} for {url}")]
    Status {
        provider: String,
        status: u16,
        url: String,
    },

    #[error("{provider} response could not be parsed: {reason}")]
    Parse { provider: String, reason: String },

    #[error("{provider} is misconfigured: {reason}")]
    Configuration { provider: String, reason: String },

    #[error("{provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },
}

/// Stable provider identity derived from its display name.
///
/// Lower-cased, with every non-alphanumeric character replaced by `_`, so
/// it is safe to use as a file name and as a table key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn from_name(name: &str) -> Self {
        Self(
            name.trim()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '_'
                    }
                })
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of content index a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Torrent,
    Nzb,
    Other,
}

/// Whether an index requires an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Capability flags declared by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub kind: ProviderKind,
    pub visibility: Visibility,
    /// Can search arbitrary past episodes and seasons.
    pub supports_backlog: bool,
    /// Publishes a recent-items feed worth polling.
    pub supports_periodic_refresh: bool,
}

impl Capabilities {
    /// Public torrent indexers with backlog search get a conformance suite.
    pub fn qualifies_for_conformance(&self) -> bool {
        self.kind == ProviderKind::Torrent
            && self.visibility == Visibility::Public
            && self.supports_backlog
    }
}

/// Account credentials for a provider.
///
/// There is no credential store; the harness always passes empty ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

/// State handed to provider factories.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    pub network: NetworkConfig,
    pub credentials: Credentials,
}

impl ProviderContext {
    /// Builds a session for a provider from this context.
    ///
    /// # Errors
    /// - `ProviderError::Configuration` - HTTP client could not be built
    pub fn session(&self, provider: &str) -> Result<HttpSession, ProviderError> {
        HttpSession::new(&self.network).map_err(|e| ProviderError::Configuration {
            provider: provider.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Entry kept by a provider cache after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    pub title: String,
    pub url: String,
    pub size: i64,
}

/// Provider cache: declared default search parameters plus the items
/// gathered by the last refresh.
#[derive(Debug, Default)]
pub struct ProviderCache {
    search_params: SearchStringSet,
    entries: Mutex<Vec<CachedResult>>,
    last_update: Mutex<Option<DateTime<Utc>>>,
}

impl ProviderCache {
    pub fn new(search_params: SearchStringSet) -> Self {
        Self {
            search_params,
            entries: Mutex::new(Vec::new()),
            last_update: Mutex::new(None),
        }
    }

    /// Default search strings the provider declares, per mode.
    pub fn search_params(&self) -> &SearchStringSet {
        &self.search_params
    }

    /// Replaces the cached items.
    pub fn replace(&self, entries: Vec<CachedResult>) {
        *self.entries.lock() = entries;
        *self.last_update.lock() = Some(Utc::now());
    }

    pub fn entries(&self) -> Vec<CachedResult> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.lock()
    }
}

/// Extraction of the canonical title/URL pair and size from a raw result.
///
/// The defaults read the canonical fields; providers whose raw results
/// carry these under other shapes override them.
pub trait ResultAccessors {
    /// Title with spaces turned into dots, and the link with HTML-escaped
    /// ampersands undone. Empty values come back as `None`.
    fn title_and_url(&self, result: &RawResult) -> (Option<String>, Option<String>) {
        let title = result
            .get("title")
            .and_then(Value::as_str)
            .map(|t| t.trim().replace(' ', "."))
            .filter(|t| !t.is_empty());
        let url = result
            .get("link")
            .and_then(Value::as_str)
            .map(|u| u.trim().replace("&amp;", "&"))
            .filter(|u| !u.is_empty());
        (title, url)
    }

    /// Size in bytes, or `-1` when unknown.
    fn size(&self, result: &RawResult) -> i64 {
        result
            .get("size")
            .and_then(Value::as_i64)
            .unwrap_or(UNKNOWN_SIZE)
    }
}

/// A pluggable search index driven by the harness.
#[async_trait]
pub trait SearchProvider: ResultAccessors + Send + Sync + fmt::Debug {
    /// Display name, e.g. `"Magneto"`.
    fn name(&self) -> &str;

    fn id(&self) -> ProviderId {
        ProviderId::from_name(self.name())
    }

    fn capabilities(&self) -> Capabilities;

    /// Network client every request of this provider goes through.
    fn session(&self) -> &HttpSession;

    fn cache(&self) -> &ProviderCache;

    /// Forgets state carried over from earlier traffic, such as auth tokens.
    ///
    /// The harness calls this at the start of every operation, so each
    /// operation's cassette holds all the requests it needs.
    fn reset(&self) {}

    /// Runs every query string of every mode in `strings`.
    ///
    /// # Errors
    /// - `ProviderError::Http` - Request failed or no cassette interaction
    /// - `ProviderError::Status` - Index answered with a non-success status
    /// - `ProviderError::Parse` - Response could not be parsed
    async fn search(&self, strings: &SearchStringSet) -> Result<Vec<RawResult>, ProviderError>;

    /// Refreshes the cache from the recent-items feed.
    ///
    /// Returns the number of cached items.
    ///
    /// # Errors
    /// Propagates errors from [`SearchProvider::search`].
    async fn update_cache(&self) -> Result<usize, ProviderError> {
        let rss = self
            .cache()
            .search_params()
            .get(SearchMode::Rss)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![String::new()]);

        let results = self
            .search(&SearchStringSet::single(SearchMode::Rss, rss))
            .await?;

        let entries: Vec<CachedResult> = results
            .iter()
            .filter_map(|result| {
                let (title, url) = self.title_and_url(result);
                Some(CachedResult {
                    title: title?,
                    url: url?,
                    size: self.size(result),
                })
            })
            .collect();

        tracing::debug!("{} cache refreshed with {} items", self.name(), entries.len());
        let count = entries.len();
        self.cache().replace(entries);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResultRecord;

    struct FieldAccessors;
    impl ResultAccessors for FieldAccessors {}

    #[test]
    fn test_provider_id_is_file_name_safe() {
        assert_eq!(ProviderId::from_name("Magneto").as_str(), "magneto");
        assert_eq!(ProviderId::from_name("Torrent API (v2)").as_str(), "torrent_api__v2_");
        assert_eq!(ProviderId::from_name(" ilCorsaroNero ").as_str(), "ilcorsaronero");
    }

    #[test]
    fn test_qualification_requires_public_backlog_torrent() {
        let qualifying = Capabilities {
            kind: ProviderKind::Torrent,
            visibility: Visibility::Public,
            supports_backlog: true,
            supports_periodic_refresh: false,
        };
        assert!(qualifying.qualifies_for_conformance());

        assert!(!Capabilities { kind: ProviderKind::Nzb, ..qualifying }.qualifies_for_conformance());
        assert!(
            !Capabilities { visibility: Visibility::Private, ..qualifying }
                .qualifies_for_conformance()
        );
        assert!(
            !Capabilities { supports_backlog: false, ..qualifying }.qualifies_for_conformance()
        );
    }

    #[test]
    fn test_default_accessors_read_canonical_fields() {
        let raw = ResultRecord {
            title: "Show S01E01 720p".to_string(),
            link: "https://example.com/dl?id=1&amp;key=2".to_string(),
            hash: String::new(),
            seeders: 0,
            leechers: 0,
            size: 1024,
        }
        .into_raw();

        let (title, url) = FieldAccessors.title_and_url(&raw);
        assert_eq!(title.as_deref(), Some("Show.S01E01.720p"));
        assert_eq!(url.as_deref(), Some("https://example.com/dl?id=1&key=2"));
        assert_eq!(FieldAccessors.size(&raw), 1024);

        assert_eq!(FieldAccessors.title_and_url(&RawResult::new()), (None, None));
        assert_eq!(FieldAccessors.size(&RawResult::new()), UNKNOWN_SIZE);
    }

    #[test]
    fn test_credentials_default_to_empty() {
        assert!(ProviderContext::default().credentials.is_empty());
    }
}
