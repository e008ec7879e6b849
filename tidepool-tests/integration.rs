//! Integration tests for Tidepool
//!
//! These tests drive the harness across crate boundaries: registry
//! enumeration into suites, search string layering, skip handling,
//! result validation and live recording into cassettes.

#[path = "support.rs"]
mod support;

#[path = "integration/recording.rs"]
mod recording;
#[path = "integration/registry_qualification.rs"]
mod registry_qualification;
#[path = "integration/search_string_layers.rs"]
mod search_string_layers;
#[path = "integration/skip_policy.rs"]
mod skip_policy;
#[path = "integration/validation.rs"]
mod validation;
