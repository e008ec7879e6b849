//! Layering of default, provider and override search strings.

use tidepool_core::{ProviderContext, ProviderId, SearchMode, SearchStringSet};
use tidepool_harness::{OverrideTable, Policy, SearchStringGenerator};

use crate::support::{ALPHA_BASE, AlphaProvider};

fn alpha_with_cache(params: SearchStringSet) -> AlphaProvider {
    AlphaProvider::new(&ProviderContext::default(), ALPHA_BASE)
        .unwrap()
        .with_cache_params(params)
}

#[test]
fn test_override_fully_replaces_for_same_mode() {
    let mut cache = SearchStringSet::new();
    cache.insert(SearchMode::Season, ["Cached S01", "Cached S02"]);
    cache.insert(SearchMode::Rss, ["tv"]);
    let provider = alpha_with_cache(cache);

    let mut overrides = OverrideTable::new();
    overrides.insert(ProviderId::from_name("Alpha"), SearchMode::Season, ["The 100 S06"]);
    let generator = SearchStringGenerator::new(overrides);

    let season = generator.build(&provider, SearchMode::Season);
    assert_eq!(season.get(SearchMode::Season), Some(&["The 100 S06".to_string()][..]));
    assert_eq!(season.modes().count(), 1);

    let rss = generator.build(&provider, SearchMode::Rss);
    assert_eq!(rss.get(SearchMode::Rss), Some(&["tv".to_string()][..]));

    let episode = generator.build(&provider, SearchMode::Episode);
    assert_eq!(episode.get(SearchMode::Episode), Some(&["The 100 S07E08".to_string()][..]));
}

#[test]
fn test_policy_file_overrides_reach_the_generator() {
    let policy = Policy::from_toml_str(
        r#"
        [overrides.ALPHA]
        Episode = ["Star Trek Picard S01E04"]
        "#,
    )
    .unwrap();
    let generator = SearchStringGenerator::new(policy.overrides);
    let provider = alpha_with_cache(SearchStringSet::new());

    let episode = generator.build(&provider, SearchMode::Episode);
    assert_eq!(
        episode.get(SearchMode::Episode),
        Some(&["Star Trek Picard S01E04".to_string()][..])
    );

    let movie = generator.build(&provider, SearchMode::Movie);
    assert_eq!(movie.get(SearchMode::Movie), Some(&["Black Panther 2018".to_string()][..]));
}
