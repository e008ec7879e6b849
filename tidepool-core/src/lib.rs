//! Tidepool Core - Provider interface and deterministic network layer
//!
//! This crate provides the building blocks the conformance harness drives:
//! the provider capability interface, the cassette-backed HTTP session that
//! makes provider runs replayable, the provider registry, and configuration.

pub mod cassette;
pub mod config;
pub mod http;
pub mod provider;
pub mod record;
pub mod registry;
pub mod search;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use cassette::{
    Cassette, CassetteError, CassetteKey, CassetteKeying, CassetteStore, Interaction,
    RecordMode, RecordedRequest, RecordedResponse,
};
pub use config::{CassetteConfig, ConfigError, HarnessConfig, NetworkConfig};
pub use http::{HttpError, HttpResponse, HttpSession};
pub use provider::{
    CachedResult, Capabilities, Credentials, ProviderCache, ProviderContext, ProviderError,
    ProviderId, ProviderKind, ResultAccessors, SearchProvider, Visibility,
};
pub use record::{RESULT_FIELDS, RawResult, ResultRecord, UNKNOWN_SIZE};
pub use registry::{Enumeration, ProviderFactory, ProviderRegistry, SetupError};
pub use search::{SearchMode, SearchStringSet};
