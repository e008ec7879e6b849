//! Recorded HTTP interactions for deterministic provider runs.
//!
//! A cassette is an ordered, append-only list of request/response pairs
//! persisted as YAML under a key derived from the provider identity.
//! Requests are matched on method, URL and body; each stored interaction is
//! served at most once, in recording order. Unseen requests either go to the
//! network and get appended ([`RecordMode::Extend`]) or fail
//! ([`RecordMode::Playback`]).

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderId;

const CASSETTE_FORMAT_VERSION: u32 = 1;

/// Errors raised while replaying or persisting cassettes.
#[derive(Debug, Error)]
pub enum CassetteError {
    #[error("No matching interaction in cassette '{key}' for {method} {url}")]
    NoMatchingInteraction {
        key: String,
        method: String,
        url: String,
    },

    #[error("Cassette file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Cassette I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cassette '{key}': {reason}")]
    Serialize { key: String, reason: String },
}

/// How a cassette treats requests it has no stored interaction for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Serve stored interactions only; unseen requests fail.
    Playback,
    /// Serve stored interactions and record unseen ones live.
    #[default]
    Extend,
}

impl RecordMode {
    /// Whether unseen requests may reach the network.
    pub fn allows_recording(self) -> bool {
        matches!(self, Self::Extend)
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => write!(f, "playback"),
            Self::Extend => write!(f, "extend"),
        }
    }
}

impl std::str::FromStr for RecordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "playback" | "none" => Ok(Self::Playback),
            "extend" | "new_episodes" => Ok(Self::Extend),
            _ => Err(format!(
                "Invalid record mode: '{s}'. Valid options are: playback, extend"
            )),
        }
    }
}

/// How cassette keys are derived for a provider's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CassetteKeying {
    /// Every operation of a provider shares one cassette.
    #[default]
    PerProvider,
    /// Each operation of a provider records into its own cassette.
    PerOperation,
}

impl fmt::Display for CassetteKeying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerProvider => write!(f, "provider"),
            Self::PerOperation => write!(f, "operation"),
        }
    }
}

impl std::str::FromStr for CassetteKeying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provider" | "per_provider" => Ok(Self::PerProvider),
            "operation" | "per_operation" => Ok(Self::PerOperation),
            _ => Err(format!(
                "Invalid cassette keying: '{s}'. Valid options are: provider, operation"
            )),
        }
    }
}

/// Stable identifier of a persisted cassette.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CassetteKey(String);

impl CassetteKey {
    /// Key shared by all operations of a provider.
    pub fn for_provider(provider: &ProviderId) -> Self {
        Self(provider.as_str().to_string())
    }

    /// Key isolating one operation of a provider.
    pub fn for_operation(provider: &ProviderId, operation: &str) -> Self {
        Self(format!("{}.{operation}", provider.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the cassette is persisted under.
    pub fn file_name(&self) -> String {
        format!("{}.yaml", self.0)
    }
}

impl fmt::Display for CassetteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound request as stored in a cassette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

impl RecordedRequest {
    /// Matching rule: same method, URL and body. Headers are ignored.
    pub fn matches(&self, other: &RecordedRequest) -> bool {
        self.method.eq_ignore_ascii_case(&other.method)
            && self.url == other.url
            && self.body == other.body
    }
}

/// Response as stored in a cassette.
///
/// Header values and the body are kept as UTF-8 text; invalid sequences are
/// replaced with U+FFFD when recorded. Binary payloads such as `.torrent`
/// files therefore do not replay byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

/// One request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Serialize, Deserialize)]
struct CassetteFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    interactions: Vec<Interaction>,
}

fn default_version() -> u32 {
    CASSETTE_FORMAT_VERSION
}

#[derive(Debug, Default)]
struct CassetteState {
    interactions: Vec<Interaction>,
    played: Vec<bool>,
    persisted: usize,
}

/// Open cassette for one test operation.
///
/// Single owner per operation; share it with the provider's HTTP session
/// through an `Arc` while the operation runs.
#[derive(Debug)]
pub struct Cassette {
    key: CassetteKey,
    path: PathBuf,
    mode: RecordMode,
    state: Mutex<CassetteState>,
}

impl Cassette {
    /// Opens the cassette stored at `path`, or an empty one if the file does
    /// not exist yet.
    ///
    /// # Errors
    /// - `CassetteError::Io` - File exists but cannot be read
    /// - `CassetteError::Corrupt` - File is not a valid cassette
    pub fn load(path: PathBuf, key: CassetteKey, mode: RecordMode) -> Result<Self, CassetteError> {
        let interactions = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let file: CassetteFile =
                    serde_yaml::from_str(&text).map_err(|e| CassetteError::Corrupt {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                if file.version != CASSETTE_FORMAT_VERSION {
                    return Err(CassetteError::Corrupt {
                        path,
                        reason: format!("unsupported cassette version {}", file.version),
                    });
                }
                file.interactions
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(CassetteError::Io { path, source }),
        };

        tracing::debug!(
            "Opened cassette '{}' ({} interactions, mode={})",
            key,
            interactions.len(),
            mode
        );

        let persisted = interactions.len();
        Ok(Self {
            key,
            path,
            mode,
            state: Mutex::new(CassetteState {
                played: vec![false; interactions.len()],
                interactions,
                persisted,
            }),
        })
    }

    pub fn key(&self) -> &CassetteKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    /// Number of interactions stored, including ones recorded this run.
    pub fn len(&self) -> usize {
        self.state.lock().interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests of every stored interaction, in recording order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .interactions
            .iter()
            .map(|interaction| interaction.request.clone())
            .collect()
    }

    /// Number of stored interactions served so far.
    pub fn play_count(&self) -> usize {
        self.state.lock().played.iter().filter(|p| **p).count()
    }

    /// Number of interactions appended since the last flush.
    pub fn new_interaction_count(&self) -> usize {
        let state = self.state.lock();
        state.interactions.len() - state.persisted
    }

    /// Serves the first unplayed interaction matching `request`.
    pub fn play(&self, request: &RecordedRequest) -> Option<RecordedResponse> {
        let mut state = self.state.lock();
        let CassetteState {
            interactions,
            played,
            ..
        } = &mut *state;

        let index = interactions
            .iter()
            .zip(played.iter())
            .position(|(interaction, played)| !played && interaction.request.matches(request))?;

        played[index] = true;
        tracing::debug!(
            "Cassette '{}' replayed interaction #{} for {} {}",
            self.key,
            index,
            request.method,
            request.url
        );
        Some(interactions[index].response.clone())
    }

    /// Appends a live interaction.
    ///
    /// The new interaction counts as already played so it is not served again
    /// within the same run.
    ///
    /// # Errors
    /// - `CassetteError::NoMatchingInteraction` - Cassette is in playback mode
    pub fn record(
        &self,
        request: RecordedRequest,
        response: RecordedResponse,
    ) -> Result<(), CassetteError> {
        if !self.mode.allows_recording() {
            return Err(self.no_match(&request));
        }

        tracing::debug!(
            "Cassette '{}' recorded {} {} -> {}",
            self.key,
            request.method,
            request.url,
            response.status
        );

        let mut state = self.state.lock();
        state.interactions.push(Interaction { request, response });
        state.played.push(true);
        Ok(())
    }

    /// Error for a request the cassette cannot serve.
    pub fn no_match(&self, request: &RecordedRequest) -> CassetteError {
        CassetteError::NoMatchingInteraction {
            key: self.key.to_string(),
            method: request.method.clone(),
            url: request.url.clone(),
        }
    }

    /// Persists newly recorded interactions.
    ///
    /// Returns `false` without touching the file when nothing was recorded.
    ///
    /// # Errors
    /// - `CassetteError::Serialize` - Interactions could not be encoded
    /// - `CassetteError::Io` - Cassette directory or file could not be written
    pub fn flush(&self) -> Result<bool, CassetteError> {
        let mut state = self.state.lock();
        if state.interactions.len() == state.persisted {
            return Ok(false);
        }

        let file = CassetteFile {
            version: CASSETTE_FORMAT_VERSION,
            interactions: state.interactions.clone(),
        };
        let text = serde_yaml::to_string(&file).map_err(|e| CassetteError::Serialize {
            key: self.key.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CassetteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, text).map_err(|source| CassetteError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(
            "Flushed {} new interactions to cassette {}",
            state.interactions.len() - state.persisted,
            self.path.display()
        );
        state.persisted = state.interactions.len();
        Ok(true)
    }
}

/// Directory of cassettes plus the mode and keying they are opened with.
#[derive(Debug, Clone)]
pub struct CassetteStore {
    dir: PathBuf,
    mode: RecordMode,
    keying: CassetteKeying,
}

impl CassetteStore {
    pub fn new(dir: impl Into<PathBuf>, mode: RecordMode, keying: CassetteKeying) -> Self {
        Self {
            dir: dir.into(),
            mode,
            keying,
        }
    }

    /// Creates a store from cassette configuration.
    pub fn from_config(config: &crate::config::CassetteConfig) -> Self {
        Self::new(config.dir.clone(), config.record_mode, config.keying)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn keying(&self) -> CassetteKeying {
        self.keying
    }

    /// Derives the cassette key for an operation of `provider`.
    pub fn key_for(&self, provider: &ProviderId, operation: &str) -> CassetteKey {
        match self.keying {
            CassetteKeying::PerProvider => CassetteKey::for_provider(provider),
            CassetteKeying::PerOperation => CassetteKey::for_operation(provider, operation),
        }
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &CassetteKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Opens the cassette for `key`.
    ///
    /// # Errors
    /// - `CassetteError::Io` - Existing cassette cannot be read
    /// - `CassetteError::Corrupt` - Existing cassette cannot be parsed
    pub fn open(&self, key: CassetteKey) -> Result<Cassette, CassetteError> {
        Cassette::load(self.path_for(&key), key, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn request(url: &str) -> RecordedRequest {
        RecordedRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn response(body: &str) -> RecordedResponse {
        RecordedResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn store(dir: &Path, mode: RecordMode) -> CassetteStore {
        CassetteStore::new(dir, mode, CassetteKeying::PerProvider)
    }

    #[test]
    fn test_key_derivation_is_pure_function_of_identity() {
        let id = ProviderId::from_name("Magneto");
        let shared = store(Path::new("cassettes"), RecordMode::Extend);
        assert_eq!(shared.key_for(&id, "rss_search"), shared.key_for(&id, "episode_search"));
        assert_eq!(shared.key_for(&id, "rss_search").file_name(), "magneto.yaml");

        let isolated = CassetteStore::new("cassettes", RecordMode::Extend, CassetteKeying::PerOperation);
        assert_eq!(isolated.key_for(&id, "rss_search").as_str(), "magneto.rss_search");
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cassette = assert_ok!(store(dir.path(), RecordMode::Playback).open(CassetteKey::for_provider(
            &ProviderId::from_name("alpha")
        )));
        assert!(cassette.is_empty());
        assert!(cassette.play(&request("http://example.com/")).is_none());
    }

    #[test]
    fn test_record_flush_and_replay_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let key = CassetteKey::for_provider(&ProviderId::from_name("alpha"));

        let recording = store(dir.path(), RecordMode::Extend).open(key.clone()).unwrap();
        assert_ok!(recording.record(request("http://example.com/a"), response("first")));
        assert_ok!(recording.record(request("http://example.com/a"), response("second")));
        assert_eq!(recording.new_interaction_count(), 2);
        assert!(assert_ok!(recording.flush()));
        assert!(!assert_ok!(recording.flush()));

        let replay = store(dir.path(), RecordMode::Playback).open(key).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.play(&request("http://example.com/a")).unwrap().body, "first");
        assert_eq!(replay.play(&request("http://example.com/a")).unwrap().body, "second");
        assert!(replay.play(&request("http://example.com/a")).is_none());
        assert_eq!(replay.play_count(), 2);
    }

    #[test]
    fn test_playback_refuses_to_record() {
        let dir = tempfile::tempdir().unwrap();
        let cassette = store(dir.path(), RecordMode::Playback)
            .open(CassetteKey::for_provider(&ProviderId::from_name("alpha")))
            .unwrap();

        let err = assert_err!(cassette.record(request("http://example.com/"), response("")));
        assert!(matches!(err, CassetteError::NoMatchingInteraction { .. }));
        assert!(!cassette.path().exists());
    }

    #[test]
    fn test_body_participates_in_matching() {
        let mut post = request("http://example.com/search");
        post.method = "POST".to_string();
        post.body = "q=one".to_string();

        let mut other = post.clone();
        other.body = "q=two".to_string();
        other.headers.push(("X-Trace".to_string(), "1".to_string()));

        assert!(!post.matches(&other));
        other.body = "q=one".to_string();
        assert!(post.matches(&other));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.yaml"), "interactions: [not, a, cassette").unwrap();

        let result = store(dir.path(), RecordMode::Extend)
            .open(CassetteKey::for_provider(&ProviderId::from_name("alpha")));
        assert!(matches!(result, Err(CassetteError::Corrupt { .. })));
    }
}
