//! Failure taxonomy for conformance operations.

use thiserror::Error;
use tidepool_core::{CassetteError, HttpError, ProviderError};

use crate::validator::Violation;

/// Why a (provider, operation) pair failed.
#[derive(Debug, Error)]
pub enum ConformanceError {
    /// Provider could not be constructed; no operations ran for it.
    #[error("{provider} failed to initialize: {reason}")]
    Setup { provider: String, reason: String },

    /// Cassette could not serve, load or persist an interaction.
    #[error("Interaction mismatch: {0}")]
    InteractionMismatch(#[from] CassetteError),

    #[error(
        "Result #{index} '{title}' breaks the result contract: {}",
        join_violations(.violations)
    )]
    ContractViolation {
        index: usize,
        title: String,
        violations: Vec<Violation>,
    },

    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    #[error("Provider error: {0}")]
    Provider(ProviderError),
}

impl From<ProviderError> for ConformanceError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Http(HttpError::Cassette(e)) => ConformanceError::InteractionMismatch(e),
            other => ConformanceError::Provider(other),
        }
    }
}

impl ConformanceError {
    pub(crate) fn assertion(message: impl Into<String>) -> Self {
        ConformanceError::Assertion {
            message: message.into(),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
