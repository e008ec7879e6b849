//! Search modes and the per-mode query sets issued to providers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of search a provider is asked to perform.
///
/// Closed set: recent-items feed, single episode, full season, movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SearchMode {
    /// Recent-items feed polled periodically.
    #[serde(rename = "RSS")]
    Rss,
    /// Single episode of a show.
    Episode,
    /// Whole season of a show.
    Season,
    /// Feature film.
    Movie,
}

impl SearchMode {
    /// Returns the canonical label used in override tables and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Rss => "RSS",
            SearchMode::Episode => "Episode",
            SearchMode::Season => "Season",
            SearchMode::Movie => "Movie",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rss" => Ok(SearchMode::Rss),
            "episode" => Ok(SearchMode::Episode),
            "season" => Ok(SearchMode::Season),
            "movie" => Ok(SearchMode::Movie),
            _ => Err(format!(
                "Invalid search mode: '{s}'. Valid options are: RSS, Episode, Season, Movie"
            )),
        }
    }
}

/// Ordered query strings per search mode.
///
/// Layers are combined with [`SearchStringSet::overlay`], which replaces the
/// whole list of a mode rather than merging element-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchStringSet(BTreeMap<SearchMode, Vec<String>>);

impl SearchStringSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding a single mode.
    pub fn single<I, S>(mode: SearchMode, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        set.insert(mode, strings);
        set
    }

    /// Replaces the strings for `mode`.
    pub fn insert<I, S>(&mut self, mode: SearchMode, strings: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(mode, strings.into_iter().map(Into::into).collect());
    }

    /// Returns the strings for `mode`, if present.
    pub fn get(&self, mode: SearchMode) -> Option<&[String]> {
        self.0.get(&mode).map(Vec::as_slice)
    }

    /// Whether `mode` has an entry.
    pub fn contains(&self, mode: SearchMode) -> bool {
        self.0.contains_key(&mode)
    }

    /// Modes present in the set.
    pub fn modes(&self) -> impl Iterator<Item = SearchMode> + '_ {
        self.0.keys().copied()
    }

    /// Iterates `(mode, strings)` pairs in mode order.
    pub fn iter(&self) -> impl Iterator<Item = (SearchMode, &[String])> {
        self.0.iter().map(|(mode, strings)| (*mode, strings.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies `other` on top of `self`; each mode present in `other`
    /// replaces the corresponding list.
    pub fn overlay(&mut self, other: &SearchStringSet) {
        for (mode, strings) in &other.0 {
            self.0.insert(*mode, strings.clone());
        }
    }

    /// Keeps only the entry for `mode`.
    pub fn restrict(mut self, mode: SearchMode) -> Self {
        self.0.retain(|m, _| *m == mode);
        self
    }
}
