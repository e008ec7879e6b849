//! Centralized configuration for Tidepool.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the harness.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cassette::{CassetteKeying, RecordMode};

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Central configuration for a harness run.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub cassette: CassetteConfig,
    pub network: NetworkConfig,
    /// TOML file replacing the built-in skip and override tables
    pub policy_file: Option<PathBuf>,
}

/// Where cassettes live and how they are opened.
#[derive(Debug, Clone)]
pub struct CassetteConfig {
    /// Directory holding one YAML file per cassette key
    pub dir: PathBuf,
    /// Whether unseen requests may reach the network
    pub record_mode: RecordMode,
    /// Whether operations of one provider share a cassette
    pub keying: CassetteKeying,
}

impl Default for CassetteConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cassettes"),
            record_mode: RecordMode::Extend,
            keying: CassetteKeying::PerProvider,
        }
    }
}

/// HTTP settings for provider sessions.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for a single live request
    pub request_timeout: Duration,
    /// User agent sent to indexers
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("tidepool/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HarnessConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// # Errors
    /// - `ConfigError::InvalidValue` - A variable is set to an unparseable value
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("TIDEPOOL_CASSETTE_DIR") {
            config.cassette.dir = PathBuf::from(dir);
        }

        if let Ok(mode) = std::env::var("TIDEPOOL_RECORD_MODE") {
            config.cassette.record_mode =
                mode.parse().map_err(|reason| ConfigError::InvalidValue {
                    variable: "TIDEPOOL_RECORD_MODE",
                    value: mode.clone(),
                    reason,
                })?;
        }

        if let Ok(keying) = std::env::var("TIDEPOOL_CASSETTE_KEYING") {
            config.cassette.keying =
                keying.parse().map_err(|reason| ConfigError::InvalidValue {
                    variable: "TIDEPOOL_CASSETTE_KEYING",
                    value: keying.clone(),
                    reason,
                })?;
        }

        if let Ok(timeout) = std::env::var("TIDEPOOL_HTTP_TIMEOUT") {
            let seconds = timeout
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    variable: "TIDEPOOL_HTTP_TIMEOUT",
                    value: timeout.clone(),
                    reason: e.to_string(),
                })?;
            config.network.request_timeout = Duration::from_secs(seconds);
        }

        if let Ok(path) = std::env::var("TIDEPOOL_POLICY_FILE") {
            config.policy_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Configuration for offline tests: playback only, cassettes under `dir`.
    pub fn for_testing(dir: impl Into<PathBuf>) -> Self {
        Self {
            cassette: CassetteConfig {
                dir: dir.into(),
                record_mode: RecordMode::Playback,
                keying: CassetteKeying::PerProvider,
            },
            network: NetworkConfig {
                request_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            policy_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = HarnessConfig::default();

        assert_eq!(config.cassette.dir, PathBuf::from("cassettes"));
        assert_eq!(config.cassette.record_mode, RecordMode::Extend);
        assert_eq!(config.cassette.keying, CassetteKeying::PerProvider);
        assert_eq!(config.network.request_timeout, Duration::from_secs(30));
        assert!(config.network.user_agent.starts_with("tidepool/"));
        assert!(config.policy_file.is_none());
    }

    #[test]
    fn test_testing_config_never_records() {
        let config = HarnessConfig::for_testing("fixtures");
        assert_eq!(config.cassette.record_mode, RecordMode::Playback);
        assert!(!config.cassette.record_mode.allows_recording());
        assert_eq!(config.cassette.dir, PathBuf::from("fixtures"));
    }
}
