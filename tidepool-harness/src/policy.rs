//! Per-provider skip and search-string override tables.
//!
//! Both tables are keyed by [`ProviderId`]. They ship with entries for the
//! bundled providers and can be replaced wholesale from a TOML file:
//!
//! ```toml
//! [skip]
//! torrentapi = ["season_search"]
//!
//! [overrides.torrentapi]
//! Season = ["The 100 S06"]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tidepool_core::{ProviderId, SearchMode, SearchStringSet};

/// Errors raised while loading a policy file.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Policy file is not valid TOML: {reason}")]
    Parse { reason: String },

    #[error("Unknown operation '{operation}' listed for provider {provider}")]
    UnknownOperation { provider: String, operation: String },

    #[error("Unknown search mode '{mode}' in overrides for provider {provider}")]
    UnknownMode { provider: String, mode: String },
}

/// One conformance check run against a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RssSearch,
    EpisodeSearch,
    SeasonSearch,
    CacheUpdate,
    ResultValues,
}

impl Operation {
    /// Every operation, in execution order.
    pub const ALL: [Operation; 5] = [
        Operation::RssSearch,
        Operation::EpisodeSearch,
        Operation::SeasonSearch,
        Operation::CacheUpdate,
        Operation::ResultValues,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::RssSearch => "rss_search",
            Operation::EpisodeSearch => "episode_search",
            Operation::SeasonSearch => "season_search",
            Operation::CacheUpdate => "cache_update",
            Operation::ResultValues => "result_values",
        }
    }

    /// Search mode whose strings the operation sends, if it searches.
    pub fn search_mode(self) -> Option<SearchMode> {
        match self {
            Operation::RssSearch => Some(SearchMode::Rss),
            Operation::EpisodeSearch | Operation::ResultValues => Some(SearchMode::Episode),
            Operation::SeasonSearch => Some(SearchMode::Season),
            Operation::CacheUpdate => None,
        }
    }

    /// Human description with the provider name filled in.
    pub fn description(self, provider: &str) -> String {
        match self {
            Operation::RssSearch => format!("Check that {provider} parses rss search results"),
            Operation::EpisodeSearch => {
                format!("Check that {provider} parses episode search results")
            }
            Operation::SeasonSearch => {
                format!("Check that {provider} parses season search results")
            }
            Operation::CacheUpdate => {
                format!("Check that {provider}'s cache parses rss search results")
            }
            Operation::ResultValues => {
                format!("Check that {provider} returns results in proper format")
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = name.strip_prefix("test_").unwrap_or(&name);
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

/// Reason reported for a skipped operation.
pub fn skip_reason(provider: &str) -> String {
    format!("Test is programmatically disabled for provider {provider}")
}

/// Operations disabled per provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    disabled: HashMap<ProviderId, BTreeSet<Operation>>,
}

impl SkipPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for the bundled providers.
    pub fn builtin() -> Self {
        let mut policy = Self::new();
        policy.disable(ProviderId::from_name("TorrentApi"), Operation::SeasonSearch);
        policy
    }

    pub fn disable(&mut self, provider: ProviderId, operation: Operation) -> &mut Self {
        self.disabled.entry(provider).or_default().insert(operation);
        self
    }

    pub fn is_skipped(&self, provider: &ProviderId, operation: Operation) -> bool {
        self.disabled
            .get(provider)
            .is_some_and(|operations| operations.contains(&operation))
    }

    pub fn is_empty(&self) -> bool {
        self.disabled.is_empty()
    }
}

/// Search strings that replace the defaults for specific providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: HashMap<ProviderId, SearchStringSet>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for the bundled providers.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(ProviderId::from_name("TorrentApi"), SearchMode::Season, ["The 100 S06"]);
        table
    }

    /// Sets the strings for one (provider, mode) pair, replacing any earlier entry.
    pub fn insert<I, S>(&mut self, provider: ProviderId, mode: SearchMode, strings: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.entry(provider).or_default().insert(mode, strings);
        self
    }

    pub fn get(&self, provider: &ProviderId) -> Option<&SearchStringSet> {
        self.entries.get(provider)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    #[serde(default)]
    skip: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    overrides: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Skip and override tables used for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub skip: SkipPolicy,
    pub overrides: OverrideTable,
}

impl Policy {
    /// Built-in tables for the bundled providers.
    pub fn builtin() -> Self {
        Self {
            skip: SkipPolicy::builtin(),
            overrides: OverrideTable::builtin(),
        }
    }

    /// Parses a policy document. Provider names are normalized to ids.
    ///
    /// # Errors
    /// - `PolicyError::Parse` - Document is not valid TOML or has unknown sections
    /// - `PolicyError::UnknownOperation` - Skip list names an unknown operation
    /// - `PolicyError::UnknownMode` - Override table names an unknown search mode
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = toml::from_str(text).map_err(|e| PolicyError::Parse {
            reason: e.to_string(),
        })?;

        let mut policy = Self::default();

        for (provider, operations) in &file.skip {
            let id = ProviderId::from_name(provider);
            for operation in operations {
                let operation =
                    operation
                        .parse::<Operation>()
                        .map_err(|_| PolicyError::UnknownOperation {
                            provider: provider.clone(),
                            operation: operation.clone(),
                        })?;
                policy.skip.disable(id.clone(), operation);
            }
        }

        for (provider, modes) in &file.overrides {
            let id = ProviderId::from_name(provider);
            for (mode, strings) in modes {
                let mode = mode
                    .parse::<SearchMode>()
                    .map_err(|_| PolicyError::UnknownMode {
                        provider: provider.clone(),
                        mode: mode.clone(),
                    })?;
                policy.overrides.insert(id.clone(), mode, strings.iter().cloned());
            }
        }

        Ok(policy)
    }

    /// Loads a policy file, replacing the built-in tables entirely.
    ///
    /// # Errors
    /// - `PolicyError::Io` - File cannot be read
    /// - Any error from [`Policy::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_toml_str(&text)?;
        tracing::info!("Loaded policy file {}", path.display());
        Ok(policy)
    }

    /// Policy file when one is configured, otherwise the built-in tables.
    ///
    /// # Errors
    /// Propagates errors from [`Policy::load`].
    pub fn resolve(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }
}
