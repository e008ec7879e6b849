//! Query strings sent to a provider for each search mode.

use tidepool_core::{SearchMode, SearchProvider, SearchStringSet};

use crate::policy::OverrideTable;

/// Strings every provider is searched with unless something replaces them.
pub fn builtin_defaults() -> SearchStringSet {
    let mut defaults = SearchStringSet::new();
    defaults.insert(SearchMode::Rss, [""]);
    defaults.insert(SearchMode::Episode, ["The 100 S07E08"]);
    defaults.insert(SearchMode::Season, ["Game of Thrones S08"]);
    defaults.insert(SearchMode::Movie, ["Black Panther 2018"]);
    defaults
}

/// Builds the search strings for one provider and mode.
///
/// Three layers, each replacing the whole list of a mode it defines:
/// built-in defaults, then the provider's cache parameters, then the
/// override table entry for the provider.
#[derive(Debug, Clone)]
pub struct SearchStringGenerator {
    defaults: SearchStringSet,
    overrides: OverrideTable,
}

impl SearchStringGenerator {
    pub fn new(overrides: OverrideTable) -> Self {
        Self {
            defaults: builtin_defaults(),
            overrides,
        }
    }

    pub fn build(&self, provider: &dyn SearchProvider, mode: SearchMode) -> SearchStringSet {
        let mut strings = self.defaults.clone();
        strings.overlay(provider.cache().search_params());
        if let Some(overrides) = self.overrides.get(&provider.id()) {
            strings.overlay(overrides);
        }
        strings.restrict(mode)
    }
}

impl Default for SearchStringGenerator {
    fn default() -> Self {
        Self::new(OverrideTable::builtin())
    }
}
