//! Tidepool Harness - conformance suites for search providers
//!
//! Turns the provider registry into one suite per public torrent provider
//! with backlog search, runs each operation against a replayable cassette,
//! and checks every returned record against the result contract.

pub mod error;
pub mod policy;
pub mod report;
pub mod runner;
pub mod search_strings;
pub mod suite;
pub mod validator;

pub use error::ConformanceError;
pub use policy::{Operation, OverrideTable, Policy, PolicyError, SkipPolicy, skip_reason};
pub use report::{OperationReport, Outcome, RunReport, Summary};
pub use runner::{ConformanceRunner, Selection};
pub use search_strings::{SearchStringGenerator, builtin_defaults};
pub use suite::{ConformanceSuite, HarnessContext, synthesize};
pub use validator::{Violation, is_absolute_url, is_magnet, validate, validate_with_accessors};
