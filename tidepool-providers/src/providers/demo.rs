//! Offline demo feed for development.

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tidepool_core::{
    Capabilities, HttpSession, ProviderCache, ProviderContext, ProviderError, ProviderKind,
    RawResult, ResultAccessors, ResultRecord, SearchMode, SearchProvider, SearchStringSet,
    Visibility,
};

const NAME: &str = "DemoFeed";

/// Demo provider that fabricates a few releases per query without touching
/// the network.
///
/// It only publishes a recent-items feed and cannot search the backlog, so
/// it never qualifies for a conformance suite. Useful for exercising the CLI
/// and cache refresh paths locally.
#[derive(Debug)]
pub struct DemoFeedProvider {
    session: HttpSession,
    cache: ProviderCache,
}

impl DemoFeedProvider {
    /// # Errors
    /// - `ProviderError::Configuration` - Session could not be built
    pub fn new(context: &ProviderContext) -> Result<Self, ProviderError> {
        Ok(Self {
            session: context.session(NAME)?,
            cache: ProviderCache::new(SearchStringSet::single(SearchMode::Rss, ["Demo"])),
        })
    }

    fn releases(query: &str) -> Vec<RawResult> {
        let base = if query.is_empty() { "Demo" } else { query };
        let dotted = base.trim().replace(' ', ".");

        [("1080p.WEB-DL", 1_500_000_000_i64, 150_i64, 25_i64), ("720p.HDTV", 800_000_000, 95, 15)]
            .into_iter()
            .map(|(quality, size, seeders, leechers)| {
                let title = format!("{dotted}.{quality}.x264-DEMO");
                let hash = hex::encode_upper(Sha1::digest(title.as_bytes()));
                ResultRecord {
                    link: format!(
                        "magnet:?xt=urn:btih:{hash}&dn={}",
                        urlencoding::encode(&title)
                    ),
                    title,
                    hash,
                    seeders,
                    leechers,
                    size,
                }
                .into_raw()
            })
            .collect()
    }
}

impl ResultAccessors for DemoFeedProvider {}

#[async_trait]
impl SearchProvider for DemoFeedProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            kind: ProviderKind::Torrent,
            visibility: Visibility::Public,
            supports_backlog: false,
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
        Ok(strings
            .iter()
            .flat_map(|(_, queries)| queries.iter())
            .flat_map(|query| Self::releases(query))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_results_are_deterministic() {
        let provider = DemoFeedProvider::new(&ProviderContext::default()).unwrap();
        let strings = SearchStringSet::single(SearchMode::Episode, ["The 100 S07E08"]);

        let first = provider.search(&strings).await.unwrap();
        let second = provider.search(&strings).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let record = ResultRecord::from_raw(&first[0]).unwrap();
        assert_eq!(record.title, "The.100.S07E08.1080p.WEB-DL.x264-DEMO");
        assert_eq!(record.hash.len(), 40);
        assert_eq!(
            tidepool_core::record::info_hash_from_magnet(&record.link),
            record.hash
        );
    }

    #[tokio::test]
    async fn test_demo_feed_never_qualifies() {
        let provider = DemoFeedProvider::new(&ProviderContext::default()).unwrap();
        assert!(!provider.capabilities().qualifies_for_conformance());

        let cached = provider.update_cache().await.unwrap();
        assert_eq!(cached, 2);
        assert_eq!(provider.cache().entries()[0].title, "Demo.1080p.WEB-DL.x264-DEMO");
    }
}
